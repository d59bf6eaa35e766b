//! Portal Types - Foundation Types (No Workspace Dependencies)
//!
//! Wire and record structures exchanged with an eFTI gate and persisted by
//! the portal client. Everything here is plain data: serde-derived structs,
//! small enums, constructors and accessors.
//!
//! ## Contents
//!
//! - Request status vocabulary shared by both search flows
//! - Identifiers search: request body, poll response, per-gate results,
//!   consignment records and their transport sub-records
//! - UIL search: request body, poll response, note request
//!
//! ## Rules
//!
//! 1. **NO BUSINESS LOGIC** - classification, aggregation and polling live
//!    in `efti-portal`
//! 2. **SERIALIZABLE** - all wire types round-trip through serde with the
//!    gate's camelCase field names
//! 3. **LENIENT ON INPUT** - status strings stay raw (`String`) on the wire
//!    types so unknown values survive until they are classified

pub mod identifiers;
pub mod status;
pub mod uil;

pub use identifiers::*;
pub use status::*;
pub use uil::*;

use serde::{Deserialize, Serialize};

/// Response body of both submit endpoints (`POST /identifiers`, `POST /uil`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdResponse {
    pub request_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl RequestIdResponse {
    pub fn new(request_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: status.into(),
            error_code: None,
            error_description: None,
        }
    }
}
