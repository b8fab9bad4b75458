//! Core data types flowing through the knowledge pipeline.
//!
//! These mirror what the surrounding product persists: embeddable content
//! units (pages, file chunks, help sections), their derived artifacts
//! (chunks, embeddings, summaries), and the chat thread types the
//! conversation orchestrator owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an embeddable item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Page,
    File,
    Help,
}

impl SourceType {
    /// Label used when presenting retrieved context to the generation model.
    pub fn label(&self) -> &'static str {
        match self {
            SourceType::Page => "page",
            SourceType::File => "file",
            SourceType::Help => "help",
        }
    }
}

/// Visibility scope of a content unit: one workspace, or global (help text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerScope {
    Workspace(String),
    Global,
}

/// Any embeddable item: a page, an uploaded-file chunk, or a help section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: String,
    pub title: String,
    pub source_type: SourceType,
    pub scope: OwnerScope,
    pub body: String,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered text segment of a parent content unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub parent_id: String,
    /// 0-based, contiguous within a parent.
    pub index: usize,
    pub text: String,
    pub token_count: usize,
    pub char_count: usize,
}

/// Stored vector representation of a content unit, keyed by owner id.
///
/// Valid for its owner iff `content_hash` matches the owner's current
/// title/body/tags digest.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub owner_id: String,
    pub source_type: SourceType,
    pub content_hash: String,
    pub vector: Vec<f32>,
    pub text_len: usize,
    pub generated_at: DateTime<Utc>,
}

/// AI-generated synopsis of a page, invalidated when the page changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub page_id: String,
    pub text: String,
    pub content_hash: String,
    pub generated_at: DateTime<Utc>,
}

/// Chat mode: answer from workspace content, or from curated help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Workspace,
    Help,
}

/// A chat thread scoped to a workspace and user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub title: String,
    pub mode: ChatMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn in a conversation. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Ordered; populated for assistant messages only.
    pub citations: Vec<Citation>,
    pub created_at: DateTime<Utc>,
}

/// Reference from an assistant message back to a content unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    pub source_title: String,
    pub source_type: SourceType,
    /// Similarity of the cited source, clamped to [0, 1].
    pub relevance: f32,
    pub excerpt: String,
}

/// Transient candidate inline link; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSuggestion {
    pub target_page_id: String,
    pub target_title: String,
    pub matched_text: String,
    /// Byte offsets of the matched span in the context text; 0..0 when no
    /// literal match exists (generic-trigger suggestions).
    pub start_index: usize,
    pub end_index: usize,
    pub confidence: f32,
}

/// A ranked candidate returned by the similarity operator or keyword search.
#[derive(Debug, Clone)]
pub struct SourceHit {
    pub owner_id: String,
    pub source_type: SourceType,
    pub title: String,
    pub excerpt: String,
    pub similarity: f32,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
}
