//! Error type shared by every layer that handles an extraction request.
//!
//! [`ExtractionError`] is serialisable because it crosses the worker boundary
//! verbatim inside terminal `error` messages. Errors that never leave the
//! worker (transport and fetch failures) are defined in the `worker` crate and
//! converted to [`ExtractionError::ImportFailed`] where they surface.
//!
//! No variant is retried internally. Every error is terminal for the single
//! request that produced it and never affects the registry or other requests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while routing, importing or running an extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExtractionError {
    /// The routing prefix of a combined key names no registered library.
    ///
    /// Produced by: the registry and router, before any backend is invoked.
    #[error("Invalid key: no library registered for '{key}'")]
    UnknownLibrary {
        /// The routing prefix (or library key) that failed to resolve.
        key: String,
    },

    /// A library could not be fetched or registered.
    ///
    /// Produced by: the worker when handling an `import` control message.
    #[error("Import of library '{key}' failed: {reason}")]
    ImportFailed {
        /// The library key named by the import.
        key: String,
        /// Human-readable description of the failure.
        reason: String,
    },

    /// A backend failed while listing or processing.
    ///
    /// Propagated unchanged through the throttle; the request is aborted and
    /// any partially folded aggregate is discarded.
    #[error("Backend '{library}' failed: {message}")]
    BackendError {
        /// Library key of the failing backend.
        library: String,
        /// Backend-supplied description of the failure.
        message: String,
    },

    /// A progress report had a total block count of zero, so no percentage
    /// can be derived from it.
    #[error("Degenerate progress: {processed} of {total} blocks")]
    DegenerateProgress {
        /// Reported processed block count.
        processed: u64,
        /// Reported total block count.
        total: u64,
    },

    /// The request itself was rejected before routing (e.g. a correlation id
    /// that is already in flight).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
    },
}

impl ExtractionError {
    /// Convenience constructor for [`ExtractionError::BackendError`].
    pub fn backend(library: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendError {
            library: library.into(),
            message: message.into(),
        }
    }
}
