//! Persistence abstraction for the knowledge pipeline.
//!
//! The [`Store`] trait covers every storage operation the pipeline needs,
//! including the vector-similarity query operator the product's managed
//! backend provides server-side. Implementations must be `Send + Sync`.
//!
//! The product wires this to its managed backend; [`memory::InMemoryStore`]
//! is the bundled implementation for tests and local runs.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    ContentUnit, Conversation, EmbeddingRecord, Message, SourceHit, SourceType, SummaryRecord,
};

/// Scope of a retrieval query: one workspace's content, or global help text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    Workspace(String),
    Help,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Group | Methods |
/// |-------|---------|
/// | Content units | `upsert_unit`, `get_unit`, `list_pages`, `delete_unit` |
/// | Embeddings | `get_embedding_hash`, `upsert_embedding`, `delete_embedding` |
/// | Retrieval | `similarity_search`, `keyword_search` |
/// | Summaries | `get_summary`, `upsert_summary`, `delete_summary`, `list_summaries` |
/// | Conversations | `create_conversation`, `get_conversation`, `update_conversation_title`, `delete_conversation`, `append_message`, `list_messages` |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a content unit (page, file chunk, or help section).
    async fn upsert_unit(&self, unit: &ContentUnit) -> Result<()>;

    async fn get_unit(&self, id: &str) -> Result<Option<ContentUnit>>;

    /// All pages in a workspace, for link suggestion and bulk jobs.
    async fn list_pages(&self, workspace_id: &str) -> Result<Vec<ContentUnit>>;

    async fn delete_unit(&self, id: &str) -> Result<()>;

    /// Content hash of the stored embedding for `owner_id`, if any.
    /// Used for change detection without loading the vector.
    async fn get_embedding_hash(&self, owner_id: &str) -> Result<Option<String>>;

    /// Upsert keyed by owner id; last write wins on conflict.
    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()>;

    /// Remove the embedding row; safe to call when none exists.
    async fn delete_embedding(&self, owner_id: &str) -> Result<()>;

    /// Server-side vector-similarity ranking, scoped and filtered to the
    /// given source types, best-first, up to `limit` rows.
    async fn similarity_search(
        &self,
        query: &[f32],
        scope: &SearchScope,
        source_types: &[SourceType],
        limit: usize,
    ) -> Result<Vec<SourceHit>>;

    /// Plain text search over title and content; the retrieval engine's
    /// last-resort strategy.
    async fn keyword_search(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> Result<Vec<SourceHit>>;

    async fn get_summary(&self, page_id: &str) -> Result<Option<SummaryRecord>>;

    async fn upsert_summary(&self, record: &SummaryRecord) -> Result<()>;

    /// Safe to call when no summary exists.
    async fn delete_summary(&self, page_id: &str) -> Result<()>;

    /// Summaries of all pages in a workspace.
    async fn list_summaries(&self, workspace_id: &str) -> Result<Vec<SummaryRecord>>;

    async fn create_conversation(&self, conversation: &Conversation) -> Result<()>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    async fn update_conversation_title(&self, id: &str, title: &str) -> Result<()>;

    /// Deletes the conversation and cascades to its messages.
    async fn delete_conversation(&self, id: &str) -> Result<()>;

    /// Append-only; also bumps the conversation's `updated_at`.
    async fn append_message(&self, message: &Message) -> Result<()>;

    /// Messages in chronological order.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
}
