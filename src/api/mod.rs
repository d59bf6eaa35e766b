//! Gate API boundary.
//!
//! `PortalApi` is the seam between the request-lifecycle engine and the
//! transport. `HttpPortalApi` talks to a live gate; `ScriptedApi` replays
//! canned responses in memory.

pub mod http;
pub mod scripted;

use async_trait::async_trait;
use portal_types::{
    IdentifiersResponse, IdentifiersSearchRequest, NoteRequest, RequestIdResponse,
    UilResponse, UilSearchRequest,
};

use crate::error::Result;

pub use http::HttpPortalApi;
pub use scripted::{ApiCall, ScriptedApi};

#[async_trait]
pub trait PortalApi: Send + Sync {
    /// `POST /identifiers`
    async fn post_identifiers(&self, request: &IdentifiersSearchRequest) -> Result<RequestIdResponse>;

    /// `GET /identifiers?requestId=<id>`
    async fn get_identifiers(&self, request_id: &str) -> Result<IdentifiersResponse>;

    /// `POST /uil`
    async fn post_uil(&self, request: &UilSearchRequest) -> Result<RequestIdResponse>;

    /// `GET /uil?requestId=<id>`
    async fn get_uil(&self, request_id: &str) -> Result<UilResponse>;

    /// `POST /note`; the acknowledgement body is opaque.
    async fn post_note(&self, note: &NoteRequest) -> Result<serde_json::Value>;

    /// Static asset text, e.g. the document stylesheet.
    async fn fetch_asset(&self, path: &str) -> Result<String>;
}
