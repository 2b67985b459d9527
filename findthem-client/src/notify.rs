//! User-facing notices

use crate::backend::{Operation, RequestError};
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    Info,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Error => "error",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Info => "info",
        };
        f.write_str(s)
    }
}

/// A title and message shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title, message)
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title, message)
    }

    /// The notice for a failed operation
    pub fn for_error(err: &RequestError, operation: Operation) -> Self {
        match err {
            RequestError::Validation(v) => Self::new(NoticeLevel::Warning, v.title(), capitalize(&v.to_string())),
            RequestError::Timeout(_) => Self::new(
                NoticeLevel::Error,
                "Timeout",
                "Request took too long. Please try again.",
            ),
            RequestError::AuthExpired => Self::new(NoticeLevel::Error, "Session Expired", err.to_string()),
            RequestError::Connection(_) => Self::new(
                NoticeLevel::Error,
                "Connection Error",
                "Could not reach the server. Check that the backend is running.",
            ),
            RequestError::ResponseFormat(_) | RequestError::Rejected(_) => {
                Self::new(NoticeLevel::Error, format!("{} Error", operation.label()), err.to_string())
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Sink for notices
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => error!(title = %notice.title, "{}", notice.message),
            NoticeLevel::Warning => warn!(title = %notice.title, "{}", notice.message),
            NoticeLevel::Success | NoticeLevel::Info => info!(title = %notice.title, "{}", notice.message),
        }
    }
}
