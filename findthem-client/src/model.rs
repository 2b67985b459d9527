//! Records exchanged with the backend
//!
//! These mirror the backend's JSON shapes. The client only displays them;
//! scores and counts are taken as-is.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a case reports a missing person or a found person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Missing,
    Found,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Missing => "missing",
            CaseStatus::Found => "found",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "missing" => Ok(CaseStatus::Missing),
            "found" => Ok(CaseStatus::Found),
            other => Err(format!("unknown case status '{}'", other)),
        }
    }
}

/// Case list filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseFilter {
    #[default]
    All,
    Only(CaseStatus),
}

impl CaseFilter {
    pub fn status(&self) -> Option<CaseStatus> {
        match self {
            CaseFilter::All => None,
            CaseFilter::Only(status) => Some(*status),
        }
    }
}

/// A missing/found person record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: i64,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    pub status: CaseStatus,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub contact: String,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A case returned by a search, annotated with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    #[serde(default)]
    pub case_id: Option<i64>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    pub status: CaseStatus,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub contact: String,
    #[serde(default)]
    pub image_path: Option<String>,
    /// Raw 0-1 score, when the backend includes it
    #[serde(default)]
    pub similarity_score: Option<f64>,
    /// Score in percent (0-100)
    pub similarity_percentage: f64,
}

/// Case counts for the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_cases: u64,
    pub missing_persons: u64,
    pub found_persons: u64,
}

/// Receipt for an accepted case submission
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitReceipt {
    #[serde(default)]
    pub case_id: Option<i64>,
    #[serde(default)]
    pub faces_detected: u32,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// A server-side database backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub timestamp: String,
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
