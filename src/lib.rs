//! # Noteworks
//!
//! The retrieval-augmented knowledge pipeline behind a workspace
//! note-taking product: it turns pages, uploaded documents, and help
//! articles into searchable embedded knowledge, and answers questions
//! about them in cited, conversational form.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Pages/Files/ │──▶│ Chunk + Hash │──▶│   Store      │
//! │ Help content │   │  + Embed     │   │ (vectors,    │
//! └──────────────┘   └──────────────┘   │  summaries)  │
//!                                       └──────┬──────┘
//!                          ┌───────────────────┤
//!                          ▼                   ▼
//!                   ┌────────────┐      ┌────────────┐
//!                   │ Retrieval  │      │    Link    │
//!                   │  + Chat    │      │ Suggestion │
//!                   └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy at the public seams |
//! | [`models`] | Core data types |
//! | [`chunk`] | Token-aware recursive text chunking |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`provider`] | Embedding/generation model clients |
//! | [`store`] | Persistence trait and in-memory backend |
//! | [`index`] | Change-aware embedding maintenance |
//! | [`search`] | Multi-strategy semantic retrieval |
//! | [`suggest`] | Inline link suggestions |
//! | [`summary`] | Hash-invalidated page summaries |
//! | [`chat`] | Conversation orchestration with citations |
//! | [`jobs`] | In-process background job queue |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod jobs;
pub mod models;
pub mod provider;
pub mod search;
pub mod store;
pub mod suggest;
pub mod summary;
