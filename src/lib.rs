//! eFTI portal client - request lifecycle engine
//!
//! Searches against the federated eFTI gates are asynchronous: a submit
//! returns a request id, and the result is fetched by polling until the
//! request leaves `PENDING`.
//!
//! ## Call Chain
//! submit -> RequestRegistry (PENDING) -> PollingScheduler tick -> PortalApi
//! poll -> StatusClassifier -> RequestRegistry update -> ResultAggregator view
//! -> DocumentTransformer (open / download, on demand)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use efti_portal::{
//!     HttpPortalApi, IdentifiersSearch, PollingScheduler, PortalConfig, ResultCache,
//!     TracingNotifier,
//! };
//! use portal_types::IdentifiersSearchRequest;
//!
//! # async fn run() -> efti_portal::Result<()> {
//! let config = PortalConfig::from_env().map_err(|e| efti_portal::PortalError::Config(e.to_string()))?;
//! let api = Arc::new(HttpPortalApi::new(&config)?);
//! let search = Arc::new(IdentifiersSearch::new(
//!     api,
//!     ResultCache::in_memory(),
//!     Arc::new(TracingNotifier),
//!     &config,
//! ));
//!
//! search.submit(IdentifiersSearchRequest::new("AB-123")).await?;
//! let _polling = search.spawn_auto_poll(&PollingScheduler::new(config.poll_interval()));
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;
pub mod config;

// Lifecycle components
pub mod status;
pub mod registry;
pub mod scheduler;
pub mod aggregate;
pub mod cache;
pub mod document;

// Gate REST boundary
pub mod api;
pub mod notify;

// Search flows and views
mod poll;
pub mod identifiers;
pub mod uil;
pub mod display;

pub use aggregate::{GateBucket, GateSummary, SortDirection, SortState};
pub use api::{HttpPortalApi, PortalApi, ScriptedApi};
pub use cache::{FileStore, KeyValueStore, MemoryStore, ResultCache};
pub use config::PortalConfig;
pub use display::IdentifiersDisplay;
pub use document::{DocumentError, ExportedFile};
pub use error::{PortalError, Result};
pub use identifiers::IdentifiersSearch;
pub use notify::{ChannelNotifier, Notification, Notifier, TracingNotifier};
pub use registry::{PollReport, RequestRegistry, StaleResponsePolicy};
pub use scheduler::{Liveness, PollHandle, PollingScheduler};
pub use status::classify;
pub use uil::UilSearch;
