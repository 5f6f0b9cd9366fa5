//! Hybrid ranking: vector similarity blended with keyword overlap
//!
//! Two-stage retrieve-then-rerank: the vector stage provides semantic
//! recall, the lexical stage corrects for embedding drift on exact-term
//! queries (ticker symbols, names). Weighting is fixed and vector-dominant.

use std::collections::HashSet;

use tracing::debug;

use crate::analysis::store::EmbeddingRecord;

/// Weight of the vector-similarity component
pub const VECTOR_WEIGHT: f32 = 0.7;
/// Weight of the keyword-overlap component
pub const KEYWORD_WEIGHT: f32 = 0.3;

/// Over-fetch factor applied to the vector stage so the lexical stage has a
/// pool to re-rank
pub const CANDIDATE_FACTOR: usize = 2;

/// A candidate with its hybrid score breakdown
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: EmbeddingRecord,
    pub vector_score: f32,
    pub keyword_score: f32,
    pub combined_score: f32,
}

/// Case-insensitive whitespace-token overlap between query and candidate,
/// normalized by the query's token count. Empty query scores 0.
pub fn keyword_overlap(query: &str, candidate: &str) -> f32 {
    let query_words: HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();

    if query_words.is_empty() {
        return 0.0;
    }

    let candidate_words: HashSet<String> = candidate
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();

    let shared = query_words.intersection(&candidate_words).count();
    shared as f32 / query_words.len() as f32
}

/// Rank candidates by `0.7 × (1 − distance) + 0.3 × keyword overlap`,
/// descending, stable on ties (retrieval order preserved), truncated to
/// `limit`. Deterministic for identical inputs.
pub fn rank_hybrid(query: &str, candidates: Vec<EmbeddingRecord>, limit: usize) -> Vec<ScoredRecord> {
    let mut scored: Vec<ScoredRecord> = candidates
        .into_iter()
        .map(|record| {
            // Distance is assumed normalized to [0, 1]; out-of-range values
            // just shift the score range.
            let vector_score = 1.0 - record.distance;
            let keyword_score = keyword_overlap(query, &record.text);
            let combined_score = VECTOR_WEIGHT * vector_score + KEYWORD_WEIGHT * keyword_score;

            ScoredRecord {
                record,
                vector_score,
                keyword_score,
                combined_score,
            }
        })
        .collect();

    // Vec::sort_by is stable: equal scores keep retrieval order
    scored.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);

    debug!("Hybrid ranking kept {} candidates", scored.len());
    scored
}
