//! Durable client settings and the in-memory admin session

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Similarity threshold must be between 0 and 100, got {0}")]
    InvalidThreshold(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    similarity_threshold: Option<f64>,
}

/// The persisted similarity threshold.
///
/// Read once on open; changed only through [`SettingsStore::set_threshold`]
/// and [`SettingsStore::clear_threshold`], which write through to disk.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: Mutex<SettingsFile>,
}

impl SettingsStore {
    /// Load settings from `path`; a missing file means no threshold
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let current = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| SettingsError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SettingsFile::default(),
            Err(source) => return Err(SettingsError::Io { path, source }),
        };
        debug!(path = %path.display(), threshold = ?current.similarity_threshold, "Loaded settings");

        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    /// No file backing; changes are kept for the process lifetime only
    pub fn in_memory(similarity_threshold: Option<f64>) -> Self {
        Self {
            path: PathBuf::new(),
            current: Mutex::new(SettingsFile { similarity_threshold }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SettingsFile> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn threshold(&self) -> Option<f64> {
        self.lock().similarity_threshold
    }

    pub fn set_threshold(&self, value: f64) -> Result<(), SettingsError> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(SettingsError::InvalidThreshold(value));
        }
        self.store(Some(value))?;
        info!(threshold = value, "Similarity threshold set");
        Ok(())
    }

    pub fn clear_threshold(&self) -> Result<(), SettingsError> {
        self.store(None)?;
        info!("Similarity threshold cleared");
        Ok(())
    }

    fn store(&self, similarity_threshold: Option<f64>) -> Result<(), SettingsError> {
        let mut current = self.lock();
        let next = SettingsFile { similarity_threshold };
        if !self.path.as_os_str().is_empty() {
            self.write(&next)?;
        }
        *current = next;
        Ok(())
    }

    /// Write to a sibling temp file, then rename over the target
    fn write(&self, settings: &SettingsFile) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(settings).map_err(|source| SettingsError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

/// An authenticated admin session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub token: String,
    pub password: String,
}

impl AdminSession {
    pub fn new(password: impl Into<String>) -> Self {
        let now = Utc::now();
        let token = format!(
            "{:x}{:08x}",
            now.timestamp(),
            now.timestamp_subsec_nanos()
        );
        Self {
            token,
            password: password.into(),
        }
    }
}

/// Holds at most one admin session
#[derive(Debug, Default)]
pub struct SessionStore {
    session: Mutex<Option<AdminSession>>,
}

impl SessionStore {
    fn lock(&self) -> MutexGuard<'_, Option<AdminSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<AdminSession> {
        self.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    pub fn start(&self, password: &str) -> AdminSession {
        let session = AdminSession::new(password);
        *self.lock() = Some(session.clone());
        session
    }

    /// Returns whether a session was active
    pub fn clear(&self) -> bool {
        self.lock().take().is_some()
    }
}
