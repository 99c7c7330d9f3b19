//! Domain search types and the deterministic ordering/fusion-key contract.

use crate::chunk::ChunkRole;
use crate::spans::Language;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// `k` constant in reciprocal-rank fusion: `1 / (k + rank)`.
pub const RRF_K: u32 = 60;

/// Search query payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Query text.
    pub query: Box<str>,
}

/// Search options controlling a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Maximum number of results to return (`top_k`).
    pub top_k: u32,
    /// Optional minimum score threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
    /// Only return chunks whose `path` starts with this prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<Box<str>>,
    /// Number of candidates to fetch from each of dense/FTS before fusion.
    pub candidate_limit: u32,
    /// Skip the MaxSim rerank stage and return RRF order directly.
    pub no_rerank: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: None,
            path_prefix: None,
            candidate_limit: 50,
            no_rerank: false,
        }
    }
}

/// Deterministic result key used both for ordering and as the fusion key in
/// reciprocal-rank fusion: "chunk identity, stable across re-indexing" per
/// the hybrid search spec, i.e. `(path, start_line)` rather than the row id
/// (which changes on every re-index since it's a fresh UUID per insert).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultKey {
    /// Stable logical path identifier.
    pub path: Box<str>,
    /// 0-indexed starting line of the chunk.
    pub start_line: u32,
}

/// A single ranked search result, ready for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Ordering/fusion key.
    pub key: SearchResultKey,
    /// 0-indexed inclusive ending line of the chunk.
    pub end_line: u32,
    /// Short content preview.
    pub preview: Box<str>,
    /// Optional language hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Final score (RRF-fused, or MaxSim-reranked when rerank succeeded).
    pub score: f32,
    /// Coarse behavioral role, carried through from the chunk.
    pub role: ChunkRole,
    /// Symbols defined by the chunk.
    pub defined_symbols: Vec<Box<str>>,
    /// Breadcrumb context trail.
    pub context: Vec<Box<str>>,
}

/// Deterministic ordering contract used both for presentation sort and RRF
/// tie-breaking (SPEC_FULL §8 property 9):
/// 1) score (desc)
/// 2) path (asc)
/// 3) `start_line` (asc)
/// 4) `end_line` (asc)
#[must_use]
pub fn compare_search_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    let score_order = b.score.total_cmp(&a.score);
    if score_order != Ordering::Equal {
        return score_order;
    }

    let path_order = a.key.path.cmp(&b.key.path);
    if path_order != Ordering::Equal {
        return path_order;
    }

    let start_order = a.key.start_line.cmp(&b.key.start_line);
    if start_order != Ordering::Equal {
        return start_order;
    }

    a.end_line.cmp(&b.end_line)
}

/// Fuse a dense-search ranked list and an FTS ranked list by reciprocal rank.
///
/// Each list contributes `1 / (k_rrf + rank)` per hit, `rank` being 1-based
/// position in that list. Hits present in both lists sum their contributions.
/// The fused order is sorted by descending score with the same tie-break as
/// [`compare_search_results`] (`path` asc, then `start_line` asc).
#[must_use]
pub fn reciprocal_rank_fusion(
    dense: &[SearchResultKey],
    fts: &[SearchResultKey],
    k_rrf: u32,
) -> Vec<(SearchResultKey, f32)> {
    let mut scores: HashMap<SearchResultKey, f32> = HashMap::new();

    for (rank, key) in dense.iter().enumerate() {
        let contribution = 1.0 / (k_rrf as f32 + (rank + 1) as f32);
        *scores.entry(key.clone()).or_insert(0.0) += contribution;
    }
    for (rank, key) in fts.iter().enumerate() {
        let contribution = 1.0 / (k_rrf as f32 + (rank + 1) as f32);
        *scores.entry(key.clone()).or_insert(0.0) += contribution;
    }

    let mut fused: Vec<(SearchResultKey, f32)> = scores.into_iter().collect();
    fused.sort_by(|(key_a, score_a), (key_b, score_b)| {
        let score_order = score_b.total_cmp(score_a);
        if score_order != Ordering::Equal {
            return score_order;
        }
        let path_order = key_a.path.cmp(&key_b.path);
        if path_order != Ordering::Equal {
            return path_order;
        }
        key_a.start_line.cmp(&key_b.start_line)
    });
    fused
}

/// Late-interaction MaxSim score between a query token matrix and a document
/// token matrix, both row-major `token_count * dim`. For each query token,
/// take the maximum inner product over document tokens, then sum.
///
/// Document tokens listed in `stop_token_ids` (by index into `doc_tokens`)
/// are skipped, matching the optional stop-list filter in the search spec.
#[must_use]
pub fn maxsim_score(
    query_matrix: &[f32],
    query_dim: usize,
    doc_matrix: &[f32],
    doc_dim: usize,
    stop_token_ids: Option<&[usize]>,
) -> f32 {
    if query_dim == 0 || doc_dim == 0 || query_dim != doc_dim {
        return 0.0;
    }

    let query_tokens = query_matrix.chunks_exact(query_dim);
    let doc_tokens: Vec<&[f32]> = doc_matrix.chunks_exact(doc_dim).collect();

    let mut total = 0.0_f32;
    for query_token in query_tokens {
        let mut best = f32::MIN;
        for (doc_index, doc_token) in doc_tokens.iter().enumerate() {
            if stop_token_ids.is_some_and(|stops| stops.contains(&doc_index)) {
                continue;
            }
            let dot: f32 = query_token
                .iter()
                .zip(doc_token.iter())
                .map(|(a, b)| a * b)
                .sum();
            if dot > best {
                best = dot;
            }
        }
        if best > f32::MIN {
            total += best;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(path: &str, start_line: u32, score: f32) -> SearchResult {
        SearchResult {
            key: SearchResultKey {
                path: path.into(),
                start_line,
            },
            end_line: start_line + 1,
            preview: "".into(),
            language: None,
            score,
            role: ChunkRole::Implementation,
            defined_symbols: Vec::new(),
            context: Vec::new(),
        }
    }

    #[test]
    fn search_result_ordering_matches_contract() {
        let a = result("b.ts", 1, 0.9);
        let b = result("a.ts", 1, 0.9);
        let c = result("a.ts", 5, 0.9);
        let d = result("a.ts", 1, 0.95);

        let mut results = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        results.sort_by(compare_search_results);
        assert_eq!(results, vec![d, b, c, a]);
    }

    #[test]
    fn search_options_default_matches_spec_defaults() {
        let options = SearchOptions::default();
        assert_eq!(options.top_k, 5);
        assert_eq!(options.candidate_limit, 50);
        assert!(!options.no_rerank);
    }

    fn key(path: &str, start_line: u32) -> SearchResultKey {
        SearchResultKey {
            path: path.into(),
            start_line,
        }
    }

    #[test]
    fn rrf_sums_contributions_from_both_lists() {
        let dense = vec![key("a.rs", 1), key("b.rs", 1)];
        let fts = vec![key("b.rs", 1), key("a.rs", 1)];
        let fused = reciprocal_rank_fusion(&dense, &fts, RRF_K);
        assert_eq!(fused.len(), 2);
        // Both keys appear at rank 1 and rank 2 across the two lists, so
        // their fused scores are equal; tie-break falls back to path order.
        assert_eq!(fused[0].0, key("a.rs", 1));
        assert_eq!(fused[1].0, key("b.rs", 1));
        assert!((fused[0].1 - fused[1].1).abs() < f32::EPSILON);
    }

    #[test]
    fn rrf_gives_only_dense_hits_their_own_contribution() {
        let dense = vec![key("a.rs", 1)];
        let fts: Vec<SearchResultKey> = Vec::new();
        let fused = reciprocal_rank_fusion(&dense, &fts, RRF_K);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < f32::EPSILON);
    }

    #[test]
    fn maxsim_picks_best_inner_product_per_query_token() {
        // One query token, dim 2; two doc tokens.
        let query = vec![1.0, 0.0];
        let doc = vec![0.0, 1.0, 1.0, 0.0];
        let score = maxsim_score(&query, 2, &doc, 2, None);
        assert!((score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn maxsim_skips_stop_listed_doc_tokens() {
        let query = vec![1.0, 0.0];
        let doc = vec![1.0, 0.0, 0.0, 1.0];
        let full = maxsim_score(&query, 2, &doc, 2, None);
        let filtered = maxsim_score(&query, 2, &doc, 2, Some(&[0]));
        assert!((full - 1.0).abs() < f32::EPSILON);
        assert!(filtered.abs() < f32::EPSILON);
    }

    #[test]
    fn maxsim_handles_dimension_mismatch_safely() {
        let score = maxsim_score(&[1.0, 0.0], 2, &[1.0], 1, None);
        assert_eq!(score, 0.0);
    }
}
