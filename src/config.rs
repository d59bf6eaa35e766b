//! Portal configuration - defaults, YAML file, environment overrides.
//!
//! Resolution order: built-in defaults, then the YAML file named by
//! `PORTAL_CONFIG` (if any), then individual `PORTAL_*` variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::PortalError;
use crate::registry::StaleResponsePolicy;

/// Gate codes shown on the federated search map.
pub const DEFAULT_GATES: [&str; 30] = [
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT", "LV",
    "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE", "SY", "LI", "BO",
];

/// Storage key of the persisted auto-poll preference.
pub const AUTO_POLL_FLAG: &str = "AUTO-POLLING";

// ---------------------------------------------------------------------------
// PortalConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Base URL of the gate REST API.
    pub api_base_url: String,

    /// Endpoint paths, relative to `api_base_url`.
    pub endpoints: Endpoints,

    /// Static location of the document stylesheet, relative to `api_base_url`.
    pub stylesheet_path: String,

    /// Auto-poll cadence (milliseconds). The first tick fires immediately.
    pub poll_interval_ms: u64,

    /// Per-request HTTP timeout (seconds).
    pub request_timeout_secs: u64,

    /// Value of the auto-poll preference when it was never set.
    pub auto_poll_default: bool,

    /// Directory of the file-backed result cache.
    pub storage_dir: PathBuf,

    /// Gates known to the summary view, in display order.
    pub known_gates: Vec<String>,

    /// What to do with a poll response older than one already applied.
    pub stale_responses: StaleResponsePolicy,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8880".to_string(),
            endpoints: Endpoints::default(),
            stylesheet_path: "/assets/xslt/eCMR.xslt".to_string(),
            poll_interval_ms: 2000,
            request_timeout_secs: 30,
            auto_poll_default: false,
            storage_dir: PathBuf::from("data/portal-cache"),
            known_gates: DEFAULT_GATES.iter().map(|g| g.to_string()).collect(),
            stale_responses: StaleResponsePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub identifiers: String,
    pub uil: String,
    pub note: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            identifiers: "/identifiers".to_string(),
            uil: "/uil".to_string(),
            note: "/note".to_string(),
        }
    }
}

impl PortalConfig {
    /// Load from a YAML file; missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        let config: PortalConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then `PORTAL_CONFIG`, then individual `PORTAL_*` overrides.
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var("PORTAL_CONFIG") {
            Ok(path) => Self::load_from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let config = base.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var("PORTAL_API_URL") {
            self.api_base_url = url;
        }
        if let Ok(ms) = std::env::var("PORTAL_POLL_INTERVAL_MS") {
            self.poll_interval_ms = ms
                .parse()
                .with_context(|| format!("PORTAL_POLL_INTERVAL_MS is not a number: {ms}"))?;
        }
        if let Ok(dir) = std::env::var("PORTAL_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    pub fn validate(&self) -> std::result::Result<(), PortalError> {
        self.base_url()?;
        if self.poll_interval_ms == 0 {
            return Err(PortalError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn base_url(&self) -> std::result::Result<Url, PortalError> {
        Url::parse(&self.api_base_url)
            .map_err(|e| PortalError::Config(format!("invalid api_base_url: {e}")))
    }

    /// Resolve an endpoint path against the base URL, keeping any base path.
    pub fn endpoint_url(&self, path: &str) -> std::result::Result<Url, PortalError> {
        let base = self.base_url()?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| PortalError::Config(format!("invalid endpoint {path}: {e}")))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}
