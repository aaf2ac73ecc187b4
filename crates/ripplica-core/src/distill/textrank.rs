//! Extractive summarization by sentence-graph ranking

use crate::cache::content_tokens;
use crate::text::split_sentences;
use std::collections::HashSet;

const DAMPING: f64 = 0.85;
const TOLERANCE: f64 = 1e-4;
const MAX_ITERATIONS: usize = 50;

/// Results shorter than this share of the input are retried at a higher ratio
const MIN_RETAINED_SHARE: f64 = 0.4;
const MAX_RATIO: f32 = 0.8;
const RATIO_STEP: f32 = 0.2;

/// Edge weight between two sentences: shared words normalized by length
fn similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let common = a.intersection(b).count();
    if common == 0 {
        return 0.0;
    }
    let norm = (a.len() as f64).ln() + (b.len() as f64).ln();
    if norm <= 0.0 {
        return 0.0;
    }
    common as f64 / norm
}

/// Weighted PageRank over a symmetric adjacency matrix
fn rank(weights: &[Vec<f64>]) -> Vec<f64> {
    let n = weights.len();
    let out_weight: Vec<f64> = weights.iter().map(|row| row.iter().sum()).collect();
    let mut scores = vec![1.0; n];

    for iteration in 0..MAX_ITERATIONS {
        let mut next = vec![1.0 - DAMPING; n];
        for (i, slot) in next.iter_mut().enumerate() {
            let incoming: f64 = (0..n)
                .filter(|&j| j != i && weights[j][i] > 0.0 && out_weight[j] > 0.0)
                .map(|j| weights[j][i] / out_weight[j] * scores[j])
                .sum();
            *slot += DAMPING * incoming;
        }

        let delta = next
            .iter()
            .zip(&scores)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        scores = next;
        if delta < TOLERANCE {
            tracing::trace!("Sentence ranking converged after {} iterations", iteration + 1);
            break;
        }
    }
    scores
}

/// Keep the `ceil(ratio * n)` highest-ranked sentences in their original
/// order. `None` when the text has fewer than two sentences to rank.
pub fn summarize(content: &str, ratio: f32) -> Option<String> {
    let sentences = split_sentences(content);
    let n = sentences.len();
    if n < 2 {
        return None;
    }

    let tokens: Vec<HashSet<String>> = sentences.iter().map(|s| content_tokens(s)).collect();
    let mut weights = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let w = similarity(&tokens[i], &tokens[j]);
            weights[i][j] = w;
            weights[j][i] = w;
        }
    }

    let scores = rank(&weights);
    let keep = ((ratio.clamp(0.0, 1.0) as f64 * n as f64).ceil() as usize).clamp(1, n);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    let mut chosen: Vec<usize> = order.into_iter().take(keep).collect();
    chosen.sort_unstable();

    Some(
        chosen
            .into_iter()
            .map(|i| sentences[i].as_str())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// [`summarize`], retried once at a higher ratio when the first pass keeps
/// too little of the input
pub fn summarize_with_escalation(content: &str, ratio: f32) -> Option<String> {
    let summary = summarize(content, ratio)?;
    let input_len = content.chars().count() as f64;
    if (summary.chars().count() as f64) < input_len * MIN_RETAINED_SHARE {
        let escalated = (ratio + RATIO_STEP).min(MAX_RATIO);
        tracing::debug!("Summary kept too little, retrying at ratio {:.2}", escalated);
        return summarize(content, escalated);
    }
    Some(summary)
}
