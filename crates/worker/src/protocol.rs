//! Wire messages exchanged across the worker boundary.
//!
//! Every message is one JSON object whose `method` field selects the variant.
//!
//! | Direction | `method` | Other fields |
//! |-----------|----------|--------------|
//! | in  | `import` | `params`: library key |
//! | in  | `addRemoteLibraries` | `params`: `{ key: location }` |
//! | in  | `list` | `id` |
//! | in  | `process` | `id`, `params`: extraction request |
//! | out | `import` | `key`, `result`: list of the imported library |
//! | out | `importFailed` | `key`, `error` (only when failure reporting is enabled) |
//! | out | `list` | `id`, `result` |
//! | out | `process` | `id`, `result`: one throttled partial result |
//! | out | `complete` | `id` |
//! | out | `error` | `id`, `error` |
//! | out | `rejected` | `id`, `error`: the request was refused and never started |
//!
//! `list`, `complete` and `error` end a request. `rejected` does not: it
//! answers a request that reused the id of one still running, and that
//! running request continues to its own terminal message.

use std::collections::BTreeMap;

use extraction::{
    ExtractionError, ExtractionRequest, FetchLocation, LibraryKey, ListResponse, PartialResult,
    RequestId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to encode or decode a wire message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Messages sent by the host to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum InboundMessage {
    /// Fetch and register a library from its known location.
    Import { params: LibraryKey },
    /// Record fetch locations for libraries that may be imported later.
    AddRemoteLibraries {
        params: BTreeMap<LibraryKey, FetchLocation>,
    },
    /// List every registered extractor.
    List { id: RequestId },
    /// Run one extraction.
    Process {
        id: RequestId,
        params: ExtractionRequest,
    },
}

/// Messages sent by the worker to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum OutboundMessage {
    Import {
        key: LibraryKey,
        result: ListResponse,
    },
    ImportFailed {
        key: LibraryKey,
        error: ExtractionError,
    },
    List {
        id: RequestId,
        result: ListResponse,
    },
    Process {
        id: RequestId,
        result: PartialResult,
    },
    Complete {
        id: RequestId,
    },
    Error {
        id: RequestId,
        error: ExtractionError,
    },
    Rejected {
        id: RequestId,
        error: ExtractionError,
    },
}

impl OutboundMessage {
    /// Correlation id of request-scoped messages.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::List { id, .. }
            | Self::Process { id, .. }
            | Self::Complete { id }
            | Self::Error { id, .. }
            | Self::Rejected { id, .. } => Some(id),
            Self::Import { .. } | Self::ImportFailed { .. } => None,
        }
    }

    /// `true` for the last message a request will ever receive.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::List { .. } | Self::Complete { .. } | Self::Error { .. }
        )
    }
}

pub fn decode_inbound(raw: &str) -> Result<InboundMessage, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn decode_outbound(raw: &str) -> Result<OutboundMessage, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}
