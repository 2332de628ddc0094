//! Reciprocal rank fusion of the embedding and keyword result lists.

use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use super::store::ScoredDocument;

#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    /// Smoothing constant; 60 is the customary value.
    pub k: f32,
    /// Length of the fused list.
    pub top_k: usize,
}

/// Fuses ranked lists: each document scores `sum(1 / (k + rank))` over the
/// lists it appears in, with 1-based ranks. Equal scores fall back to the id
/// order so the output is deterministic.
pub fn rrf_fuse(lists: &[Vec<ScoredDocument>], cfg: &RrfConfig) -> Vec<ScoredDocument> {
    let mut fused: HashMap<Uuid, ScoredDocument> = HashMap::new();

    for list in lists {
        for (i, hit) in list.iter().enumerate() {
            let add = 1.0 / (cfg.k + (i as f32) + 1.0);
            fused
                .entry(hit.document.id)
                .and_modify(|entry| entry.score += add)
                .or_insert_with(|| ScoredDocument {
                    document: hit.document.clone(),
                    score: add,
                });
        }
    }

    let mut out: Vec<ScoredDocument> = fused.into_values().collect();
    out.sort_by(|a, b| match b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal) {
        Ordering::Equal => a.document.id.cmp(&b.document.id),
        other => other,
    });
    out.truncate(cfg.top_k);
    out
}
