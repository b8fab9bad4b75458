//! Crate-level error taxonomy.
//!
//! Four failure classes cross the public seams of the pipeline:
//! malformed caller input, missing entities, external model-service
//! failures, and persistence failures. External-service errors are
//! caught at the point of call and routed into fallbacks wherever a
//! degraded answer is acceptable; only persistence failures that would
//! corrupt conversation continuity propagate to callers as-is.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input, rejected before any external call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// An entity referenced by id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An embedding or generation model call failed.
    #[error("external service call failed: {0}")]
    ExternalService(#[source] anyhow::Error),

    /// A store read or write failed where silent loss would corrupt state.
    #[error("persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),

    /// An uploaded file has a format the ingestor does not handle.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The underlying extractor rejected the file (corrupt or truncated).
    #[error("document parse failed: {0}")]
    ParseFailure(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}
