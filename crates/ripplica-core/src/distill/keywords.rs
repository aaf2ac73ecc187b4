//! Keyword-overlap sentence scoring against the query

use std::collections::HashSet;

const QUERY_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "what", "how", "why", "when", "where",
];

const MIN_SENTENCE_CHARS: usize = 20;

fn query_terms(query: &str) -> HashSet<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| !QUERY_STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// The `max_sentences` sentences mentioning the most query terms, best
/// first. `None` when no sentence mentions any.
pub fn keyword_sentences(query: &str, content: &str, max_sentences: usize) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }

    let flattened = content.replace('\n', " ");
    let mut scored: Vec<(usize, &str)> = flattened
        .split(". ")
        .map(str::trim)
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .filter_map(|sentence| {
            let lower = sentence.to_lowercase();
            let score = terms.iter().filter(|t| lower.contains(t.as_str())).count();
            (score > 0).then_some((score, sentence))
        })
        .collect();

    if scored.is_empty() {
        return None;
    }

    // Stable sort keeps document order among equal scores
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    Some(
        scored
            .into_iter()
            .take(max_sentences)
            .map(|(_, s)| s)
            .collect::<Vec<_>>()
            .join(". "),
    )
}
