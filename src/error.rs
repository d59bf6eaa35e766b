//! Error taxonomy for the portal engine.
//!
//! Every fallible engine operation returns `Result<T, PortalError>`; callers
//! branch on the variant. Unknown remote status strings are not errors: they
//! classify as pending (see `status`).

use crate::document::DocumentError;

pub type Result<T> = std::result::Result<T, PortalError>;

// ---------------------------------------------------------------------------
// PortalError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// Network failure or undecodable response body on submit/poll.
    #[error("{operation} failed: {message}")]
    Transport { operation: String, message: String },

    /// The gate answered with a non-success HTTP status.
    #[error("{operation} returned HTTP {status}: {body}")]
    HttpStatus {
        operation: String,
        status: u16,
        body: String,
    },

    /// Decode, parse, stylesheet or transform failure of an embedded document.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// No usable cached value under this key (absent or undecodable).
    #[error("no cached value for key {key}")]
    NotFound { key: String },

    /// The registry holds no entry for this request id.
    #[error("unknown request {request_id}")]
    UnknownRequest { request_id: String },

    /// The entry exists but carries no document payload yet.
    #[error("request {request_id} has no document data")]
    NoDocument { request_id: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PortalError {
    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// True for failures of the HTTP round-trip itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::HttpStatus { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for PortalError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
