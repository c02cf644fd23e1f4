//! Token-set similarity for fuzzy text matching
//!
//! Jaccard index over whitespace-tokenized lowercase words. Used by the
//! comment policy (threshold 0.4) and the per-name matching in the
//! change_name policy (threshold 0.6).

use std::collections::HashSet;

/// Tokenize into a lowercase word set
fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Jaccard similarity between two texts: |A ∩ B| / |A ∪ B|
///
/// Symmetric and bounded in [0, 1]. Two empty texts have no word sets to
/// compare and score 0.0; identical non-empty texts score 1.0.
pub fn calculate_similarity(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_scores_one() {
        assert_eq!(calculate_similarity("hello world", "hello world"), 1.0);
        assert_eq!(calculate_similarity("مرحبا بالجميع", "مرحبا بالجميع"), 1.0);
    }

    #[test]
    fn test_symmetric() {
        let a = "rate three new games today";
        let b = "three games";
        assert_eq!(calculate_similarity(a, b), calculate_similarity(b, a));
    }

    #[test]
    fn test_bounded() {
        let sim = calculate_similarity("a b c", "c d e");
        assert!((0.0..=1.0).contains(&sim));
        // {c} over {a,b,c,d,e}
        assert!((sim - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_scores_zero() {
        assert_eq!(calculate_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(calculate_similarity("", ""), 0.0);
        assert_eq!(calculate_similarity("word", ""), 0.0);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(calculate_similarity("Hello World", "hello world"), 1.0);
    }

    #[test]
    fn test_duplicate_words_collapse() {
        // Word sets, not bags: repeated words do not change the score
        assert_eq!(calculate_similarity("go go go", "go"), 1.0);
    }
}
