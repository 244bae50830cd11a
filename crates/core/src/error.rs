//! Error types for the EchoGarden retrieval core.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Collaborator failures have their own `SourceError`; the top-level
//! `Error` is what callers of search and pack see.

use thiserror::Error;

use crate::message::MessageKey;
use crate::search::Signal;

/// The top-level error type for ranking and packing.
#[derive(Debug, Error)]
pub enum Error {
    // --- Caller errors (never retried) ---
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    // --- Collaborator errors ---
    #[error("Upstream unavailable: {}", describe_failures(failures))]
    UpstreamUnavailable { failures: Vec<SignalFailure> },

    #[error("No content available: none of {requested} requested messages could be resolved")]
    NoContentAvailable {
        requested: usize,
        omitted: Vec<MessageKey>,
    },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure reported by a candidate source, embedder, or message store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("{signal} source timed out after {after_ms}ms")]
    Timeout { signal: Signal, after_ms: u64 },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Vector source called without a query embedding")]
    MissingEmbedding,
}

/// One signal that could not contribute to a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalFailure {
    pub signal: Signal,
    pub error: SourceError,
}

impl std::fmt::Display for SignalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.signal, self.error)
    }
}

fn describe_failures(failures: &[SignalFailure]) -> String {
    if failures.is_empty() {
        return "no candidate source succeeded".into();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
