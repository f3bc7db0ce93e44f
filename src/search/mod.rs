//! Similarity search over a loaded collection snapshot
//!
//! Brute-force scoring: every chunk scores as the dot product of its
//! unit-norm vector with the query vector, so scores lie in [-1, 1] and equal
//! cosine similarity.

use crate::store::{Collection, DocOwner};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One ranked search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Cosine similarity against the query, in [-1, 1]
    pub score: f32,
    /// Chunk text
    pub text: String,
    /// Source document name (or synthetic marker)
    pub source_name: String,
    /// Ownership tag
    pub owner: DocOwner,
    /// Append position of the chunk in its collection
    pub sequence: u64,
}

/// Rank every eligible chunk against `query` and return at most `k` results.
///
/// Results are ordered by descending score; ties break by ascending sequence
/// (the earlier-appended chunk wins) so ranking is deterministic. When
/// `owner_filter` is set, only chunks whose owner tag equals the filter
/// exactly or is scoped under it are eligible; ineligible chunks are skipped
/// and do not count toward `k`. Fewer than `k` results is valid.
pub fn search(
    query: &[f32],
    collection: &Collection,
    k: usize,
    owner_filter: Option<&str>,
) -> Vec<SearchHit> {
    if collection.is_empty() || k == 0 {
        return Vec::new();
    }
    if query.len() != collection.dimension() {
        tracing::warn!(
            "Query dimension {} does not match collection dimension {}; returning no results",
            query.len(),
            collection.dimension()
        );
        return Vec::new();
    }

    let scores = collection.vectors().dot(&ArrayView1::from(query));
    let meta = collection.meta();

    let mut order: Vec<usize> = (0..meta.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then_with(|| meta[a].sequence.cmp(&meta[b].sequence))
    });

    let mut hits = Vec::with_capacity(k.min(meta.len()));
    for i in order {
        if let Some(filter) = owner_filter {
            if !meta[i].owner.matches(filter) {
                continue;
            }
        }

        hits.push(SearchHit {
            score: scores[i],
            text: meta[i].text.clone(),
            source_name: meta[i].source_name.clone(),
            owner: meta[i].owner.clone(),
            sequence: meta[i].sequence,
        });

        if hits.len() >= k {
            break;
        }
    }

    hits
}

/// Mean score of a result list; 0 when empty.
///
/// This is the retrieval-confidence signal observed by the retrain controller.
pub fn average_score(hits: &[SearchHit]) -> f32 {
    if hits.is_empty() {
        return 0.0;
    }
    hits.iter().map(|h| h.score).sum::<f32>() / hits.len() as f32
}
