use std::cmp::Ordering;

use super::embedder::EmbeddingModel;
use super::knowledge::{search_terms, KnowledgeBase};
use super::types::{RankedChunk, RetrievedSource};
use super::RetrievalError;

/// Sources must score strictly above this to be cited.
pub const CITATION_THRESHOLD: f32 = 0.3;
/// At most this many sources are cited per turn.
pub const MAX_CITED_SOURCES: usize = 3;
/// Boost for a chunk containing every query term.
pub const KEYWORD_BOOST: f32 = 0.15;
/// Above this corpus size, keyword hits pre-filter the semantic pass.
pub const PREFILTER_MIN_CORPUS: usize = 2_000;

/// Two-stage search over a read-only knowledge base.
pub struct Retriever<'a> {
    kb: &'a KnowledgeBase,
    embedder: &'a dyn EmbeddingModel,
    prefilter_min_corpus: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(kb: &'a KnowledgeBase, embedder: &'a dyn EmbeddingModel) -> Self {
        Self {
            kb,
            embedder,
            prefilter_min_corpus: PREFILTER_MIN_CORPUS,
        }
    }

    pub fn with_prefilter_threshold(mut self, min_corpus: usize) -> Self {
        self.prefilter_min_corpus = min_corpus;
        self
    }

    /// Top `k` chunks scoring at least `min_relevance`, best first. Ties
    /// go to the chunk with more keyword hits, then to insertion order.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        min_relevance: f32,
    ) -> Result<Vec<RankedChunk<'a>>, RetrievalError> {
        self.search_in_category(query, k, min_relevance, None)
    }

    pub fn search_in_category(
        &self,
        query: &str,
        k: usize,
        min_relevance: f32,
        category: Option<&str>,
    ) -> Result<Vec<RankedChunk<'a>>, RetrievalError> {
        if self.kb.is_empty() || k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query)?;
        if let Some(expected) = self.kb.dimension() {
            if expected != query_vec.len() {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: query_vec.len(),
                });
            }
        }

        let terms = search_terms(query);
        let hits = self.kb.index().hits_for(&terms);

        let candidates: Vec<usize> =
            if self.kb.len() >= self.prefilter_min_corpus && !hits.is_empty() {
                let mut positions: Vec<usize> = hits.keys().copied().collect();
                positions.sort_unstable();
                positions
            } else {
                (0..self.kb.len()).collect()
            };

        let mut ranked: Vec<RankedChunk<'a>> = candidates
            .into_iter()
            .filter_map(|position| {
                let chunk = self.kb.get(position)?;
                if category.is_some_and(|c| !chunk.category.eq_ignore_ascii_case(c)) {
                    return None;
                }
                let semantic = dot(&query_vec, &chunk.embedding).max(0.0);
                let keyword_hits = hits.get(&position).copied().unwrap_or(0);
                let boost = if terms.is_empty() {
                    0.0
                } else {
                    KEYWORD_BOOST * keyword_hits as f32 / terms.len() as f32
                };
                Some(RankedChunk {
                    chunk,
                    relevance: (semantic + boost).clamp(0.0, 1.0),
                    semantic,
                    keyword_hits,
                    position,
                })
            })
            .filter(|r| r.relevance >= min_relevance)
            .collect();

        ranked.sort_by(compare_ranked);
        ranked.truncate(k);

        tracing::debug!(
            terms = terms.len(),
            results = ranked.len(),
            top = ranked.first().map(|r| r.relevance).unwrap_or(0.0),
            "Knowledge search"
        );
        Ok(ranked)
    }
}

fn compare_ranked(a: &RankedChunk<'_>, b: &RankedChunk<'_>) -> Ordering {
    b.relevance
        .partial_cmp(&a.relevance)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.keyword_hits.cmp(&a.keyword_hits))
        .then_with(|| a.position.cmp(&b.position))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Sources eligible for citation: relevance above the threshold, at most
/// `max` of them (never more than three), in ranked order.
pub fn citable(ranked: &[RankedChunk<'_>], max: usize) -> Vec<RetrievedSource> {
    ranked
        .iter()
        .filter(|r| r.relevance > CITATION_THRESHOLD)
        .take(max.min(MAX_CITED_SOURCES))
        .map(RankedChunk::to_source)
        .collect()
}
