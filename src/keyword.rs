//! In-memory BM25 keyword index over every chunk added to the store.
//!
//! The index is the keyword half of hybrid retrieval. It grows
//! incrementally as documents are uploaded and is never persisted; a
//! restarted server starts with an empty index, in which case hybrid
//! search degrades to pure similarity search.

use std::collections::HashMap;

use crate::models::Chunk;

/// Term-frequency saturation.
const K1: f64 = 1.5;
/// Length normalization.
const B: f64 = 0.75;

struct IndexedChunk {
    chunk: Chunk,
    term_freqs: HashMap<String, usize>,
    len: usize,
}

/// Entries are keyed by chunk id: re-adding a chunk replaces it in place.
#[derive(Default)]
pub struct KeywordIndex {
    entries: Vec<IndexedChunk>,
    positions: HashMap<String, usize>,
    doc_freq: HashMap<String, usize>,
    total_len: usize,
}

/// Lowercased alphanumeric runs.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.doc_freq.clear();
        self.total_len = 0;
    }

    pub fn add(&mut self, chunks: &[Chunk]) {
        for chunk in chunks {
            let tokens = tokenize(&chunk.content);
            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for t in &tokens {
                *term_freqs.entry(t.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            self.total_len += tokens.len();
            let entry = IndexedChunk {
                chunk: chunk.clone(),
                term_freqs,
                len: tokens.len(),
            };

            match self.positions.get(&chunk.id).copied() {
                Some(pos) => {
                    let old = std::mem::replace(&mut self.entries[pos], entry);
                    self.forget_stats(&old);
                }
                None => {
                    self.positions.insert(chunk.id.clone(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
    }

    fn forget_stats(&mut self, entry: &IndexedChunk) {
        self.total_len -= entry.len;
        for term in entry.term_freqs.keys() {
            if let Some(df) = self.doc_freq.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_freq.remove(term);
                }
            }
        }
    }

    /// Top `k` chunks by BM25 score, best first. Chunks sharing no term with
    /// the query are never returned; ties keep insertion order.
    pub fn search(&self, query: &str, k: usize) -> Vec<(Chunk, f64)> {
        let terms = tokenize(query);
        if terms.is_empty() || self.entries.is_empty() || k == 0 {
            return Vec::new();
        }

        let n = self.entries.len() as f64;
        let avg_len = (self.total_len as f64 / n).max(1.0);

        let mut scored: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let score: f64 = terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *entry.term_freqs.get(term)? as f64;
                        let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
                        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                        let norm = K1 * (1.0 - B + B * entry.len as f64 / avg_len);
                        Some(idf * tf * (K1 + 1.0) / (tf + norm))
                    })
                    .sum();
                (score > 0.0).then_some((i, score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(i, s)| (self.entries[i].chunk.clone(), s))
            .collect()
    }
}
