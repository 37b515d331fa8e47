//! Pure selection routines over a single image's scores.
//!
//! All orderings are descending by score and stable: equal scores keep their
//! original (ascending index) order. Non-finite scores are ordered with
//! `f32::total_cmp`.

use std::cmp::Ordering;

fn descending(scores: &[f32], a: usize, b: usize) -> Ordering {
    scores[b].total_cmp(&scores[a])
}

fn ranked(scores: &[f32], mut indices: Vec<usize>, limit: usize) -> Vec<usize> {
    indices.sort_by(|&a, &b| descending(scores, a, b));
    indices.truncate(limit);
    indices
}

/// The `n` most activated prototypes, strongest first.
///
/// Returns `min(n, activations.len())` distinct indices.
pub fn select_top_prototypes(activations: &[f32], n: usize) -> Vec<usize> {
    ranked(activations, (0..activations.len()).collect(), n)
}

/// The `n` most activated prototypes among those selected by `class_mask`.
///
/// Indices refer to the full prototype set. Bounded by the number of set mask
/// entries.
pub fn select_class_prototypes(activations: &[f32], class_mask: &[bool], n: usize) -> Vec<usize> {
    let members = class_mask
        .iter()
        .enumerate()
        .take(activations.len())
        .filter_map(|(idx, &member)| member.then_some(idx))
        .collect();
    ranked(activations, members, n)
}

/// The `k` highest-scoring classes, best first.
pub fn select_top_classes(logits: &[f32], k: usize) -> Vec<usize> {
    ranked(logits, (0..logits.len()).collect(), k)
}

/// Index of the largest score; the first one wins on ties.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &score)| match best {
            Some((_, best_score)) if score.total_cmp(&best_score) != Ordering::Greater => best,
            _ => Some((idx, score)),
        })
        .map(|(idx, _)| idx)
}
