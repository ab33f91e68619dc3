//! HTML similarity scoring.
//!
//! Compares the element an agent actually interacted with against the
//! expected element:
//! - Structure (tag, parent tag, sibling tags)
//! - Attributes, excluding runtime-generated ones
//! - Content (normalized text and nested markup)
//!
//! # Example
//!
//! ```rust
//! use dom_eval::html::HtmlScorer;
//!
//! let scorer = HtmlScorer::new().dynamic_attributes(["id"]);
//! let result = scorer.compare(
//!     Some(r#"<input id="x123abc" type="text">"#),
//!     r#"<input id="y789def" type="text">"#,
//! );
//! assert_eq!(result.attributes_score, 1.0);
//! ```

pub mod parse;
pub mod score;
pub mod similarity;

pub use parse::{ElementContext, TARGET_MARKER, parse_element};
pub use score::{HtmlComparison, HtmlScorer, compare_html};
