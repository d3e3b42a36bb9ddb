//! Combining ranked chunk lists.
//!
//! Both functions identify chunks by [`Chunk::dedup_key`] (trimmed content,
//! source), so the same fragment returned by two retrievers appears once.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

use crate::models::Chunk;

/// Concatenate `lists` in order, keeping only the first occurrence of each
/// de-duplication key.
pub fn merge_unique(lists: &[&[Chunk]]) -> Vec<Chunk> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for chunk in list.iter() {
            if seen.insert(chunk.dedup_key()) {
                merged.push(chunk.clone());
            }
        }
    }
    merged
}

/// Weighted reciprocal rank fusion.
///
/// Each ranking contributes `weight / (c + rank)` (1-based rank) to every
/// chunk it contains. The result holds every distinct chunk, best fused
/// score first; ties keep first-seen order. Fails when a weight is negative
/// or all weights are zero.
pub fn weighted_rrf(rankings: &[(&[Chunk], f64)], c: f64) -> Result<Vec<Chunk>> {
    if rankings.iter().any(|(_, w)| *w < 0.0 || !w.is_finite()) {
        bail!("fusion weights must be finite and non-negative");
    }
    if !rankings.is_empty() && rankings.iter().map(|(_, w)| w).sum::<f64>() <= 0.0 {
        bail!("fusion weights must not all be zero");
    }

    let mut order: Vec<&Chunk> = Vec::new();
    let mut scores: HashMap<(&str, &str), f64> = HashMap::new();
    for (ranking, weight) in rankings {
        for (rank, chunk) in ranking.iter().enumerate() {
            let key = chunk.dedup_key();
            let entry = scores.entry(key).or_insert_with(|| {
                order.push(chunk);
                0.0
            });
            *entry += weight / (c + rank as f64 + 1.0);
        }
    }

    let mut fused: Vec<(usize, f64, &Chunk)> = order
        .iter()
        .enumerate()
        .map(|(i, chunk)| (i, scores[&chunk.dedup_key()], *chunk))
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    Ok(fused.into_iter().map(|(_, _, c)| c.clone()).collect())
}
