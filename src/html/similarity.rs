//! String and sequence similarity measures used by the scorer.
//!
//! All measures return a value in [0, 1], and two empty inputs are
//! considered identical.

/// Lowercase and collapse runs of whitespace into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein similarity over chars: `1 - distance / max_len`.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Sequence similarity `2 * LCS / (len_a + len_b)`. Order-sensitive.
pub fn sequence_similarity<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(a, b) as f64 / total as f64
}

fn lcs_len<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Search\n  NOW "), "search now");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_text_similarity() {
        assert_eq!(text_similarity("", ""), 1.0);
        assert_eq!(text_similarity("search", "search"), 1.0);
        assert_eq!(text_similarity("abc", ""), 0.0);
        // kitten -> sitting is the classic distance-3 pair
        let sim = text_similarity("kitten", "sitting");
        assert!((sim - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
    }

    #[test]
    fn test_sequence_similarity() {
        let empty: [&str; 0] = [];
        assert_eq!(sequence_similarity(&empty, &empty), 1.0);
        assert_eq!(sequence_similarity(&["a", "b"], &["a", "b"]), 1.0);
        assert_eq!(sequence_similarity(&["a"], &empty), 0.0);
        assert!((sequence_similarity(&["a", "b", "c"], &["a", "c"]) - 0.8).abs() < 1e-12);
    }
}
