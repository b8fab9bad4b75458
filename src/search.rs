//! Multi-source semantic retrieval with an explicit strategy chain.
//!
//! A query is answered by the first strategy that produces candidates:
//! multi-source vector search, then page-only vector search, then plain
//! keyword search over title and content. A step falls through on error
//! or an empty raw candidate set — never because results scored below the
//! threshold. The strategy that produced the results is recorded in the
//! outcome for observability.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{SourceHit, SourceType};
use crate::provider::EmbeddingClient;
use crate::store::{SearchScope, Store};

/// Which strategy produced a search outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Vector search across every requested source type.
    MultiSource,
    /// Vector search restricted to pages.
    PageOnly,
    /// Plain text search on title and content.
    Keyword,
    /// Every strategy failed or found nothing.
    Exhausted,
}

/// A retrieval request. Thresholds are per-call-site configuration;
/// observed values in the product range 0.3-0.9.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub scope: SearchScope,
    pub threshold: f32,
    pub max_results: usize,
    pub source_types: Vec<SourceType>,
    /// Secondary metadata filter applied client-side: every returned hit
    /// must carry all of these tags. Empty means no filtering.
    pub required_tags: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, scope: SearchScope) -> Self {
        Self {
            query: query.into(),
            scope,
            threshold: 0.6,
            max_results: 10,
            source_types: vec![SourceType::Page, SourceType::File, SourceType::Help],
            required_tags: Vec::new(),
        }
    }
}

/// Ranked, threshold-filtered, deduplicated results.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<SourceHit>,
    pub strategy: SearchStrategy,
}

pub struct RetrievalEngine {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Run the strategy chain for `request`.
    ///
    /// Returns an empty outcome (never an error) when all strategies are
    /// exhausted; only malformed input is rejected.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        if request.query.trim().is_empty() {
            return Err(Error::Validation("search query must not be empty".into()));
        }
        if request.max_results == 0 {
            return Err(Error::Validation("max_results must be >= 1".into()));
        }

        // Over-fetch to leave room for threshold and tag filtering.
        let fetch_limit = request.max_results * 2;

        let query_vec = match self.embedder.embed(&request.query).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "query embedding failed, skipping vector strategies");
                None
            }
        };

        if let Some(ref vec) = query_vec {
            for (strategy, types) in [
                (SearchStrategy::MultiSource, request.source_types.clone()),
                (SearchStrategy::PageOnly, vec![SourceType::Page]),
            ] {
                // Identical to the previous step when only pages were asked for.
                if strategy == SearchStrategy::PageOnly
                    && request.source_types == [SourceType::Page]
                {
                    continue;
                }
                match self
                    .store
                    .similarity_search(vec, &request.scope, &types, fetch_limit)
                    .await
                {
                    Ok(hits) if !hits.is_empty() => {
                        let results = post_process(hits, request);
                        return Ok(SearchOutcome { results, strategy });
                    }
                    Ok(_) => {
                        debug!(?strategy, "no candidates, falling through");
                    }
                    Err(e) => {
                        warn!(?strategy, error = %e, "strategy failed, falling through");
                    }
                }
            }
        }

        match self
            .store
            .keyword_search(&request.query, &request.scope, fetch_limit)
            .await
        {
            Ok(hits) if !hits.is_empty() => {
                let results = post_process(hits, request);
                Ok(SearchOutcome {
                    results,
                    strategy: SearchStrategy::Keyword,
                })
            }
            Ok(_) => Ok(SearchOutcome {
                results: Vec::new(),
                strategy: SearchStrategy::Exhausted,
            }),
            Err(e) => {
                warn!(error = %e, "keyword strategy failed, returning empty result set");
                Ok(SearchOutcome {
                    results: Vec::new(),
                    strategy: SearchStrategy::Exhausted,
                })
            }
        }
    }
}

/// Threshold filter, per-owner best-hit merge, tag filter, deterministic
/// ordering, truncation.
fn post_process(hits: Vec<SourceHit>, request: &SearchRequest) -> Vec<SourceHit> {
    let mut best: HashMap<String, SourceHit> = HashMap::new();
    for hit in hits {
        if hit.similarity < request.threshold {
            continue;
        }
        if !request
            .required_tags
            .iter()
            .all(|t| hit.tags.contains(t))
        {
            continue;
        }
        match best.get(&hit.owner_id) {
            Some(existing) if existing.similarity >= hit.similarity => {}
            _ => {
                best.insert(hit.owner_id.clone(), hit);
            }
        }
    }

    let mut results: Vec<SourceHit> = best.into_values().collect();
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.owner_id.cmp(&b.owner_id))
    });
    results.truncate(request.max_results);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn hit(owner: &str, ty: SourceType, sim: f32) -> SourceHit {
        SourceHit {
            owner_id: owner.to_string(),
            source_type: ty,
            title: owner.to_string(),
            excerpt: String::new(),
            similarity: sim,
            updated_at: Utc::now(),
            tags: Vec::new(),
        }
    }

    fn request(threshold: f32, max_results: usize) -> SearchRequest {
        SearchRequest {
            threshold,
            max_results,
            ..SearchRequest::new("q", SearchScope::Workspace("ws".to_string()))
        }
    }

    #[test]
    fn threshold_filters_low_scores() {
        let hits = vec![
            hit("a", SourceType::Page, 0.9),
            hit("b", SourceType::Page, 0.4),
        ];
        let results = post_process(hits, &request(0.5, 10));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].owner_id, "a");
    }

    #[test]
    fn merge_keeps_best_hit_per_owner() {
        // Same page reached as a page hit and through a file chunk.
        let hits = vec![
            hit("a", SourceType::Page, 0.7),
            hit("a", SourceType::File, 0.9),
            hit("b", SourceType::Page, 0.8),
        ];
        let results = post_process(hits, &request(0.0, 10));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].owner_id, "a");
        assert_eq!(results[0].source_type, SourceType::File);
        assert!((results[0].similarity - 0.9).abs() < 1e-6);
    }

    #[test]
    fn sorted_by_similarity_then_recency() {
        let now = Utc::now();
        let mut older = hit("old", SourceType::Page, 0.8);
        older.updated_at = now - Duration::hours(2);
        let mut newer = hit("new", SourceType::Page, 0.8);
        newer.updated_at = now;

        let results = post_process(vec![older, newer], &request(0.0, 10));
        assert_eq!(results[0].owner_id, "new");
        assert_eq!(results[1].owner_id, "old");
    }

    #[test]
    fn truncates_to_max_results() {
        let hits = (0..20)
            .map(|i| hit(&format!("p{}", i), SourceType::Page, 0.5 + i as f32 * 0.01))
            .collect();
        let results = post_process(hits, &request(0.0, 5));
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn required_tags_filter_client_side() {
        let mut tagged = hit("a", SourceType::Page, 0.9);
        tagged.tags = vec!["roadmap".to_string(), "q3".to_string()];
        let untagged = hit("b", SourceType::Page, 0.95);

        let mut req = request(0.0, 10);
        req.required_tags = vec!["roadmap".to_string()];
        let results = post_process(vec![tagged, untagged], &req);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].owner_id, "a");
    }
}
