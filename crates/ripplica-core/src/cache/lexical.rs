//! Lexical overlap between two query texts

use crate::text::words;
use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "about", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does",
        "for", "from", "how", "i", "in", "is", "it", "me", "my", "of", "on", "or", "should",
        "so", "than", "that", "the", "their", "there", "these", "this", "to", "was", "we",
        "were", "what", "when", "where", "which", "who", "why", "will", "with", "you", "your",
    ]
    .into_iter()
    .collect();
}

/// Stop-word-filtered lower-cased token set
pub fn content_tokens(text: &str) -> HashSet<String> {
    words(text)
        .filter(|w| !STOP_WORDS.contains(w.as_str()))
        .collect()
}

/// Blend of Jaccard similarity and max-cardinality overlap, in `[0, 1]`.
///
/// Two empty token sets score 1.0.
pub fn lexical_score(a: &str, b: &str, jaccard_weight: f32, overlap_weight: f32) -> f32 {
    let ta = content_tokens(a);
    let tb = content_tokens(b);

    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let common = ta.intersection(&tb).count() as f32;
    let union = ta.union(&tb).count() as f32;
    let jaccard = common / union;
    let overlap = common / ta.len().max(tb.len()) as f32;

    (jaccard_weight * jaccard + overlap_weight * overlap).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_queries_score_one() {
        let s = lexical_score("capital of France", "Capital of france", 0.6, 0.4);
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_disjoint_vocabularies_score_zero() {
        assert_eq!(
            lexical_score("capital France", "population Germany", 0.6, 0.4),
            0.0
        );
    }

    #[test]
    fn test_partial_overlap() {
        // {capital, france} vs {population, france}: jaccard 1/3, overlap 1/2
        let s = lexical_score("capital of France", "population of France", 0.6, 0.4);
        let expected = 0.6 * (1.0 / 3.0) + 0.4 * 0.5;
        assert!((s - expected).abs() < 1e-6);
    }

    #[test]
    fn test_stop_words_only() {
        assert_eq!(lexical_score("what is the", "how is it", 0.6, 0.4), 1.0);
        assert_eq!(lexical_score("what is the", "rust", 0.6, 0.4), 0.0);
    }

    proptest! {
        #[test]
        fn prop_score_in_unit_interval(a in "[a-z ]{0,40}", b in "[a-z ]{0,40}") {
            let s = lexical_score(&a, &b, 0.6, 0.4);
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn prop_score_is_symmetric(a in "[a-z ]{0,40}", b in "[a-z ]{0,40}") {
            let ab = lexical_score(&a, &b, 0.6, 0.4);
            let ba = lexical_score(&b, &a, 0.6, 0.4);
            prop_assert!((ab - ba).abs() < 1e-6);
        }
    }
}
