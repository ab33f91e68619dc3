//! Structural, attribute and content scoring of element snippets.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::parse::{ElementContext, parse_element};
use super::similarity::{sequence_similarity, text_similarity};

pub const STRUCTURE_WEIGHT: f64 = 0.4;
pub const ATTRIBUTES_WEIGHT: f64 = 0.3;
pub const CONTENT_WEIGHT: f64 = 0.3;

// Structure sub-signals
const TAG_WEIGHT: f64 = 0.4;
const PARENT_WEIGHT: f64 = 0.3;
const SIBLINGS_WEIGHT: f64 = 0.3;
/// Scales the parent/sibling part when tag names differ
const TAG_MISMATCH_FACTOR: f64 = 0.25;

// Content sub-signals
const TEXT_WEIGHT: f64 = 0.7;
const MARKUP_WEIGHT: f64 = 0.3;

/// Name fragments that mark an attribute as runtime-generated.
pub const DEFAULT_DYNAMIC_NAME_FRAGMENTS: &[&str] = &[
    "session",
    "token",
    "csrf",
    "nonce",
    "timestamp",
    "reactid",
    "uuid",
    "jsaction",
];

/// Long hex or numeric runs that frameworks append to generated values.
pub const DEFAULT_DYNAMIC_VALUE_PATTERN: &str = r"(?i)(?:[0-9a-f]{8,}|\d{6,})$";

/// Outcome of comparing an actual element against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlComparison {
    pub structure_score: f64,
    pub attributes_score: f64,
    pub content_score: f64,
    pub total_score: f64,
}

impl HtmlComparison {
    /// The all-zero result used when there is nothing to compare.
    pub fn zero() -> Self {
        Self::default()
    }

    fn from_parts(structure: f64, attributes: f64, content: f64) -> Self {
        let total = STRUCTURE_WEIGHT * structure
            + ATTRIBUTES_WEIGHT * attributes
            + CONTENT_WEIGHT * content;
        Self {
            structure_score: structure,
            attributes_score: attributes,
            content_score: content,
            total_score: total.clamp(0.0, 1.0),
        }
    }
}

/// Compares element snippets, ignoring attributes that vary between runs.
#[derive(Debug, Clone)]
pub struct HtmlScorer {
    dynamic_attributes: BTreeSet<String>,
    dynamic_name_fragments: Vec<String>,
    dynamic_value_pattern: Option<Regex>,
}

impl Default for HtmlScorer {
    fn default() -> Self {
        Self {
            dynamic_attributes: BTreeSet::new(),
            dynamic_name_fragments: DEFAULT_DYNAMIC_NAME_FRAGMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            dynamic_value_pattern: Regex::new(DEFAULT_DYNAMIC_VALUE_PATTERN).ok(),
        }
    }
}

impl HtmlScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat the named attributes as dynamic.
    pub fn dynamic_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dynamic_attributes
            .extend(names.into_iter().map(|n| n.as_ref().trim().to_lowercase()));
        self
    }

    /// Replace the attribute-name denylist.
    pub fn dynamic_name_fragments<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dynamic_name_fragments = fragments
            .into_iter()
            .map(|f| f.as_ref().to_lowercase())
            .collect();
        self
    }

    /// Replace the generated-value pattern; `None` disables value detection.
    pub fn dynamic_value_pattern(mut self, pattern: Option<Regex>) -> Self {
        self.dynamic_value_pattern = pattern;
        self
    }

    /// Score `actual` against `expected`.
    ///
    /// Absent, empty or unparseable input on either side yields
    /// [`HtmlComparison::zero`].
    pub fn compare(&self, actual: Option<&str>, expected: &str) -> HtmlComparison {
        let Some(actual) = actual.and_then(parse_element) else {
            return HtmlComparison::zero();
        };
        let Some(expected) = parse_element(expected) else {
            return HtmlComparison::zero();
        };

        HtmlComparison::from_parts(
            structure_score(&actual, &expected),
            self.attributes_score(&actual.attributes, &expected.attributes),
            content_score(&actual, &expected),
        )
    }

    fn is_dynamic_name(&self, name: &str) -> bool {
        self.dynamic_attributes.contains(name)
            || self
                .dynamic_name_fragments
                .iter()
                .any(|fragment| name.contains(fragment.as_str()))
    }

    fn is_generated_value(&self, value: &str) -> bool {
        self.dynamic_value_pattern
            .as_ref()
            .is_some_and(|re| re.is_match(value.trim()))
    }

    fn attributes_score(
        &self,
        actual: &BTreeMap<String, String>,
        expected: &BTreeMap<String, String>,
    ) -> f64 {
        let keys = |attrs: &BTreeMap<String, String>| -> BTreeSet<String> {
            attrs
                .keys()
                .filter(|k| !self.is_dynamic_name(k))
                .cloned()
                .collect()
        };
        let mut actual_keys = keys(actual);
        let mut expected_keys = keys(expected);

        // Shared keys whose values both look generated drop out entirely.
        let generated: Vec<String> = actual_keys
            .intersection(&expected_keys)
            .filter(|k| {
                actual[*k] != expected[*k]
                    && self.is_generated_value(&actual[*k])
                    && self.is_generated_value(&expected[*k])
            })
            .cloned()
            .collect();
        for key in &generated {
            actual_keys.remove(key);
            expected_keys.remove(key);
        }

        let union = actual_keys.union(&expected_keys).count();
        if union == 0 {
            return 1.0;
        }

        let shared: Vec<&String> = actual_keys.intersection(&expected_keys).collect();
        let jaccard = shared.len() as f64 / union as f64;
        if shared.is_empty() {
            return 0.5 * jaccard;
        }

        let equal = shared
            .iter()
            .filter(|k| attribute_values_match(k, &actual[**k], &expected[**k]))
            .count();
        let value_match = equal as f64 / shared.len() as f64;

        0.5 * jaccard + 0.5 * value_match
    }
}

/// Compare with the default scorer.
pub fn compare_html(actual: Option<&str>, expected: &str) -> HtmlComparison {
    HtmlScorer::default().compare(actual, expected)
}

fn structure_score(actual: &ElementContext, expected: &ElementContext) -> f64 {
    let parent = if actual.parent_tag == expected.parent_tag {
        1.0
    } else {
        0.0
    };
    let siblings = sequence_similarity(&actual.sibling_tags, &expected.sibling_tags);
    let context = PARENT_WEIGHT * parent + SIBLINGS_WEIGHT * siblings;

    if actual.tag == expected.tag {
        TAG_WEIGHT + context
    } else {
        TAG_MISMATCH_FACTOR * context
    }
}

fn content_score(actual: &ElementContext, expected: &ElementContext) -> f64 {
    let text = text_similarity(&actual.text, &expected.text);
    let markup = sequence_similarity(&actual.descendant_tags, &expected.descendant_tags);
    TEXT_WEIGHT * text + MARKUP_WEIGHT * markup
}

fn attribute_values_match(name: &str, actual: &str, expected: &str) -> bool {
    if name == "class" {
        let tokens = |v: &str| v.split_whitespace().map(str::to_string).collect::<BTreeSet<_>>();
        tokens(actual) == tokens(expected)
    } else {
        actual.trim() == expected.trim()
    }
}
