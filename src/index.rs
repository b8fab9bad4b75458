//! Embedding indexer: change-aware, idempotent vector maintenance.
//!
//! Every content unit's embedding is keyed by owner id and stamped with a
//! SHA-256 digest of the text that produced it. Re-indexing unchanged
//! content is a no-op (the model is never called), so content-update flows
//! can call [`EmbeddingIndexer::index_unit`] unconditionally.
//!
//! Model and store failures here are logged and swallowed: content
//! creation must never fail because of a downstream indexing problem.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::IndexingConfig;
use crate::models::{ContentUnit, EmbeddingRecord};
use crate::provider::EmbeddingClient;
use crate::store::Store;

/// Deterministic digest over a unit's title, body, and sorted tag names.
/// Change detection only; not a security boundary.
pub fn content_hash(title: &str, body: &str, tags: &[String]) -> String {
    let mut sorted: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(body.as_bytes());
    hasher.update([0u8]);
    hasher.update(sorted.join(",").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Maintains the embedding row for each content unit.
pub struct EmbeddingIndexer {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingClient>,
    config: IndexingConfig,
}

impl EmbeddingIndexer {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingClient>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Index one unit. Skips the model call entirely when the stored
    /// embedding's content hash already matches.
    pub async fn index_unit(&self, unit: &ContentUnit) {
        let hash = content_hash(&unit.title, &unit.body, &unit.tags);

        match self.store.get_embedding_hash(&unit.id).await {
            Ok(Some(existing)) if existing == hash => {
                debug!(owner_id = %unit.id, "embedding up to date, skipping");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(owner_id = %unit.id, error = %e, "embedding hash lookup failed");
                // Fall through: worst case is a wasted model call.
            }
        }

        let text = embedding_input(unit);
        let vector = match self.embedder.embed(&text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(owner_id = %unit.id, error = %e, "embedding model call failed");
                return;
            }
        };

        let record = EmbeddingRecord {
            owner_id: unit.id.clone(),
            source_type: unit.source_type,
            content_hash: hash,
            vector,
            text_len: text.chars().count(),
            generated_at: Utc::now(),
        };
        if let Err(e) = self.store.upsert_embedding(&record).await {
            warn!(owner_id = %unit.id, error = %e, "failed to store embedding");
        }
    }

    /// Look up each owner id and index it. Missing owners are skipped
    /// with a warning.
    pub async fn index_by_id(&self, owner_id: &str) {
        match self.store.get_unit(owner_id).await {
            Ok(Some(unit)) => self.index_unit(&unit).await,
            Ok(None) => warn!(owner_id, "cannot index: unit not found"),
            Err(e) => warn!(owner_id, error = %e, "cannot index: unit lookup failed"),
        }
    }

    /// Index many owners in fixed-size batches: concurrent within a batch,
    /// a short pause between batches to respect model-service rate limits.
    /// One owner's failure never blocks the others.
    pub async fn batch_index(&self, owner_ids: &[String]) {
        let mut first = true;
        for batch in owner_ids.chunks(self.config.batch_size.max(1)) {
            if !first {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
            first = false;
            join_all(batch.iter().map(|id| self.index_by_id(id))).await;
        }
    }

    /// Remove the embedding for `owner_id`. Best-effort and idempotent:
    /// the owner is usually already gone when this runs.
    pub async fn delete(&self, owner_id: &str) {
        if let Err(e) = self.store.delete_embedding(owner_id).await {
            warn!(owner_id, error = %e, "failed to delete embedding");
        }
    }
}

/// Text handed to the embedding model: title prepended to the body so
/// title-only matches still rank.
fn embedding_input(unit: &ContentUnit) -> String {
    if unit.title.is_empty() {
        unit.body.clone()
    } else {
        format!("{}\n{}", unit.title, unit.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OwnerScope, SourceType};
    use crate::store::memory::InMemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder that counts its invocations.
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let len = text.len() as f32;
            Ok(vec![len, 1.0, 0.0])
        }

        fn dims(&self) -> usize {
            3
        }
    }

    fn unit(id: &str, title: &str, body: &str) -> ContentUnit {
        ContentUnit {
            id: id.to_string(),
            title: title.to_string(),
            source_type: SourceType::Page,
            scope: OwnerScope::Workspace("ws".to_string()),
            body: body.to_string(),
            tags: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn content_hash_is_deterministic() {
        let tags = vec!["b".to_string(), "a".to_string()];
        let h1 = content_hash("Title", "Body", &tags);
        let h2 = content_hash("Title", "Body", &tags);
        assert_eq!(h1, h2);
    }

    #[test]
    fn content_hash_ignores_tag_order() {
        let h1 = content_hash("T", "B", &["x".to_string(), "y".to_string()]);
        let h2 = content_hash("T", "B", &["y".to_string(), "x".to_string()]);
        assert_eq!(h1, h2);
    }

    #[test]
    fn content_hash_changes_with_any_field() {
        let base = content_hash("T", "B", &[]);
        assert_ne!(base, content_hash("T2", "B", &[]));
        assert_ne!(base, content_hash("T", "B2", &[]));
        assert_ne!(base, content_hash("T", "B", &["t".to_string()]));
        // Field boundaries matter: moving a char across them changes the hash.
        assert_ne!(content_hash("ab", "c", &[]), content_hash("a", "bc", &[]));
    }

    #[tokio::test]
    async fn unchanged_content_skips_the_model() {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(CountingEmbedder::new());
        let indexer = EmbeddingIndexer::new(
            store.clone(),
            embedder.clone(),
            IndexingConfig::default(),
        );

        let u = unit("p1", "Guide", "How to plan a project.");
        store.upsert_unit(&u).await.unwrap();

        indexer.index_unit(&u).await;
        indexer.index_unit(&u).await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_content_reembeds() {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(CountingEmbedder::new());
        let indexer = EmbeddingIndexer::new(
            store.clone(),
            embedder.clone(),
            IndexingConfig::default(),
        );

        let mut u = unit("p1", "Guide", "First draft.");
        store.upsert_unit(&u).await.unwrap();
        indexer.index_unit(&u).await;

        u.body = "Second draft.".to_string();
        store.upsert_unit(&u).await.unwrap();
        indexer.index_unit(&u).await;

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn batch_index_covers_all_owners() {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(CountingEmbedder::new());
        let config = IndexingConfig {
            batch_size: 2,
            batch_delay_ms: 0,
        };
        let indexer = EmbeddingIndexer::new(store.clone(), embedder.clone(), config);

        let mut ids = Vec::new();
        for i in 0..5 {
            let u = unit(&format!("p{}", i), "T", &format!("body {}", i));
            store.upsert_unit(&u).await.unwrap();
            ids.push(u.id);
        }
        // A missing owner in the middle must not block the rest.
        ids.insert(2, "ghost".to_string());

        indexer.batch_index(&ids).await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 5);
        for i in 0..5 {
            let hash = store
                .get_embedding_hash(&format!("p{}", i))
                .await
                .unwrap();
            assert!(hash.is_some(), "p{} not indexed", i);
        }
    }

    #[tokio::test]
    async fn delete_then_search_never_returns_owner() {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(CountingEmbedder::new());
        let indexer =
            EmbeddingIndexer::new(store.clone(), embedder, IndexingConfig::default());

        let u = unit("p1", "Guide", "Some body");
        store.upsert_unit(&u).await.unwrap();
        indexer.index_unit(&u).await;
        indexer.delete("p1").await;

        assert!(store.get_embedding_hash("p1").await.unwrap().is_none());
    }
}
