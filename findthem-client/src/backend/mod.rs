//! Backend abstraction and response classification

mod http;


pub use http::HttpBackend;

use crate::model::{BackupEntry, Case, CaseFilter, MatchCandidate, Statistics, SubmitReceipt};
use crate::upload::{ImageUpload, ValidatedCase, ValidationError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by backend operations
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Invalid response from server: {0}")]
    ResponseFormat(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Session expired. Please login again.")]
    AuthExpired,

    #[error("Connection error: {0}")]
    Connection(String),
}

/// The operations of the backend contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SubmitCase,
    Search,
    ListCases,
    CaseDetail,
    Statistics,
    FetchImage,
    Login,
    DeleteCase,
    CreateBackup,
    ListBackups,
    RestoreBackup,
}

impl Operation {
    /// Privileged operations turn a 401 into [`RequestError::AuthExpired`]
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Operation::DeleteCase
                | Operation::CreateBackup
                | Operation::ListBackups
                | Operation::RestoreBackup
        )
    }

    /// Message used when a rejection carries no detail
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Operation::SubmitCase => "Failed to upload case",
            Operation::Search => "Search failed",
            Operation::ListCases => "Failed to load cases",
            Operation::CaseDetail => "Failed to load case",
            Operation::Statistics => "Failed to load statistics",
            Operation::FetchImage => "Failed to fetch image from server for searching.",
            Operation::Login => "Login failed",
            Operation::DeleteCase => "Failed to delete case",
            Operation::CreateBackup => "Failed to create backup",
            Operation::ListBackups => "Failed to list backups",
            Operation::RestoreBackup => "Failed to restore backup",
        }
    }

    /// Label for notification titles
    pub fn label(&self) -> &'static str {
        match self {
            Operation::SubmitCase => "Upload",
            Operation::Search => "Search",
            Operation::ListCases | Operation::CaseDetail => "Cases",
            Operation::Statistics => "Statistics",
            Operation::FetchImage => "Fetch",
            Operation::Login => "Login",
            Operation::DeleteCase => "Delete",
            Operation::CreateBackup | Operation::ListBackups | Operation::RestoreBackup => "Backup",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Search payload: one image, optional server-side lower bound
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub image: ImageUpload,
    pub min_similarity: Option<f64>,
}

/// Raw search response. The backend has returned either a single best
/// `match`, a `matches` list, or both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default, rename = "match")]
    pub best_match: Option<MatchCandidate>,
    #[serde(default)]
    pub matches: Option<Vec<MatchCandidate>>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub total_cases_searched: Option<u64>,
    #[serde(default)]
    pub threshold_used: Option<f64>,
}

/// Health status of the backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub database: Option<String>,
    pub error: Option<String>,
}

/// The backend contract consumed by the orchestrator
#[async_trait]
pub trait CaseBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    async fn submit_case(&self, case: &ValidatedCase) -> Result<SubmitReceipt, RequestError>;

    async fn search_face(&self, request: SearchRequest) -> Result<SearchResponse, RequestError>;

    async fn list_cases(&self, filter: CaseFilter) -> Result<Vec<Case>, RequestError>;

    async fn case_detail(&self, case_id: i64) -> Result<Case, RequestError>;

    async fn statistics(&self) -> Result<Statistics, RequestError>;

    /// Download a stored case image from the uploads folder
    async fn fetch_image(&self, image_path: &str) -> Result<ImageUpload, RequestError>;

    /// Returns whether the password was accepted
    async fn login(&self, password: &str) -> Result<bool, RequestError>;

    async fn delete_case(&self, case_id: i64, admin_password: &str) -> Result<(), RequestError>;

    /// Returns the backup file name
    async fn create_backup(&self, admin_password: &str) -> Result<String, RequestError>;

    async fn list_backups(&self, admin_password: &str) -> Result<Vec<BackupEntry>, RequestError>;

    /// Returns the server's confirmation message
    async fn restore_backup(
        &self,
        backup_filename: &str,
        admin_password: &str,
    ) -> Result<String, RequestError>;

    async fn health_check(&self) -> HealthStatus;
}

/// Classify a raw HTTP outcome.
///
/// Order: 401 on a privileged call, unparseable body, non-success status or
/// `success` flag, then the decoded JSON payload.
pub fn classify(operation: Operation, status: u16, body: &[u8]) -> Result<Value, RequestError> {
    if status == 401 && operation.is_privileged() {
        return Err(RequestError::AuthExpired);
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| RequestError::ResponseFormat(e.to_string()))?;

    let ok_status = (200..300).contains(&status);
    let success = payload.get("success").and_then(Value::as_bool).unwrap_or(false);

    if !ok_status || !success {
        return Err(RequestError::Rejected(rejection_message(operation, &payload)));
    }

    Ok(payload)
}

/// Decode a classified payload into its typed shape
pub fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, RequestError> {
    serde_json::from_value(payload).map_err(|e| RequestError::ResponseFormat(e.to_string()))
}

fn rejection_message(operation: Operation, payload: &Value) -> String {
    match payload.get("detail") {
        Some(Value::String(detail)) if !detail.is_empty() => return detail.clone(),
        Some(Value::Null) | None => {}
        Some(Value::String(_)) => {}
        Some(structured) => return structured.to_string(),
    }
    match payload.get("message") {
        Some(Value::String(message)) if !message.is_empty() => message.clone(),
        _ => operation.fallback_message().to_string(),
    }
}
