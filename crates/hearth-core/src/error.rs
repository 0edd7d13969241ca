// ── Core error types ──
//
// Errors surfaced by hearth-core. Storage failures are absorbed by the
// cache layer and only reach consumers through `CacheStorage` itself;
// backend failures are local to the key or source that issued them.

use thiserror::Error;

use crate::model::EntityId;

/// Failure reported by a [`Backend`](crate::backend::Backend) request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered but refused the request.
    #[error("request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The request never got an answer (socket closed, write failed, ...).
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Failure of the durable key/value storage behind the cache.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage quota exceeded: {needed} bytes needed, {limit} byte limit")]
    QuotaExceeded { needed: u64, limit: u64 },

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Backend connection unavailable")]
    ConnectionUnavailable,

    // ── Query errors ─────────────────────────────────────────────────
    #[error("{domain}.{service} failed for {target}: {source}")]
    Backend {
        domain: String,
        service: String,
        target: EntityId,
        #[source]
        source: BackendError,
    },

    #[error("Unexpected response while {context}: {message}")]
    Decode { context: String, message: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Cache storage error: {0}")]
    Storage(#[from] StorageError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn decode(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            context: context.into(),
            message: err.to_string(),
        }
    }
}
