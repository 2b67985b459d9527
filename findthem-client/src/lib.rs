//! FindThem client - search and case management for the missing-persons service
//!
//! This crate provides:
//! - A backend abstraction with a reqwest implementation of the REST contract
//! - Match normalization, filtering and confidence labelling for search results
//! - An HTML presentation adapter with safe text encoding
//! - A request orchestrator with timeouts, session handling and stale-response fencing
//! - A cancellable auto-refresh task for the active view

pub mod backend;
pub mod matches;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod panel;
pub mod refresh;
pub mod render;
pub mod settings;
pub mod upload;

#[cfg(test)]
mod orchestrator_tests;

pub use backend::{CaseBackend, HttpBackend, RequestError};
pub use matches::{ConfidenceTier, MatchShape, RankedMatch};
pub use orchestrator::Orchestrator;
pub use refresh::{AutoRefresh, View};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api_base_url`
pub const API_URL_ENV: &str = "FINDTHEM_API_URL";

/// Errors from loading the client configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Configuration for the client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. "http://localhost:8000/api"
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL for stored case images (derived from the API base when unset)
    #[serde(default)]
    pub uploads_base_url: Option<String>,

    /// Cancellation window for every backend call (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Auto-refresh period for the dashboard and case views (seconds)
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Where the persisted similarity threshold lives
    #[serde(default)]
    pub settings_path: Option<PathBuf>,

    /// Endpoint paths, relative to `api_base_url`
    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_api_base_url() -> String { "http://localhost:8000/api".to_string() }
fn default_request_timeout_secs() -> u64 { 60 }
fn default_refresh_interval_secs() -> u64 { 30 }

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            uploads_base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            settings_path: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            tracing::info!(api_base_url = %url, "Using API URL from {}", API_URL_ENV);
            config.api_base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall every request or the refresh task
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be at least 1",
            });
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "refresh_interval_secs",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// API base without a trailing slash
    pub fn api_base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// Server origin: the API base with a trailing "/api" segment removed
    pub fn origin(&self) -> &str {
        let base = self.api_base();
        base.strip_suffix("/api").unwrap_or(base)
    }

    /// Base URL under which stored images are served
    pub fn uploads_base(&self) -> String {
        match &self.uploads_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/uploads", self.origin()),
        }
    }

    /// Settings file location, falling back to the platform config directory
    pub fn settings_file(&self) -> PathBuf {
        if let Some(path) = &self.settings_path {
            return path.clone();
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("findthem")
            .join("settings.json")
    }
}

/// Endpoint paths relative to the API base. `{id}` is replaced with the case id.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub upload_case: String,
    pub search_face: String,
    pub cases: String,
    pub case_detail: String,
    pub delete_case: String,
    pub statistics: String,
    pub login: String,
    pub backup: String,
    pub backups: String,
    pub restore: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            upload_case: "cases/upload-case".to_string(),
            search_face: "cases/search-face".to_string(),
            cases: "cases".to_string(),
            case_detail: "cases/{id}".to_string(),
            delete_case: "cases/{id}/delete".to_string(),
            statistics: "stats".to_string(),
            login: "admin/login".to_string(),
            backup: "backup".to_string(),
            backups: "backups".to_string(),
            restore: "restore".to_string(),
        }
    }
}
