//! Error types for the remote folder store

use odv_infra::{Classified, ErrorClass};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for remote store operations
pub type Result<T> = std::result::Result<T, DriveError>;

/// Errors from the remote folder store and the services built on it
#[derive(Error, Debug)]
pub enum DriveError {
    /// Credentials rejected or token expired
    #[error("Authentication failed: {message}")]
    Auth { code: Option<String>, message: String },

    /// Throttled by the server
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        code: Option<String>,
        message: String,
    },

    /// Storage quota exhausted
    #[error("Storage quota exceeded: {message}")]
    Quota { code: Option<String>, message: String },

    #[error("Not found: {message}")]
    NotFound { code: Option<String>, message: String },

    /// An item with the same name already exists
    #[error("Conflict: {message}")]
    Conflict { code: Option<String>, message: String },

    #[error("Server error ({status}): {message}")]
    Server {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Invalid folder path: '{0}'")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Report error: {0}")]
    Report(#[from] odv_report::ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Last error of an operation that was retried
    #[error("{source} (after {attempts} attempts)")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<DriveError>,
    },
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

impl DriveError {
    /// Map an error response to an error. `body` is the raw response text.
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let (code, message) = match serde_json::from_str::<GraphErrorBody>(body) {
            Ok(parsed) => (
                parsed.error.code,
                parsed
                    .error
                    .message
                    .unwrap_or_else(|| default_message(status).to_string()),
            ),
            Err(_) => (None, default_message(status).to_string()),
        };

        match status.as_u16() {
            401 => DriveError::Auth { code, message },
            429 => DriveError::RateLimited {
                retry_after: retry_after(headers),
                code,
                message,
            },
            507 => DriveError::Quota { code, message },
            404 => DriveError::NotFound { code, message },
            409 => DriveError::Conflict { code, message },
            s if status.is_server_error() => DriveError::Server {
                status: s,
                code,
                message,
            },
            s => DriveError::Api {
                status: s,
                code,
                message,
            },
        }
    }

    /// Retry class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            DriveError::Auth { .. } => ErrorClass::AuthFailure,
            DriveError::RateLimited { retry_after, .. } => ErrorClass::RateLimited {
                retry_after: *retry_after,
            },
            DriveError::Quota { .. } => ErrorClass::QuotaExceeded,
            DriveError::NotFound { .. } => ErrorClass::NotFound,
            DriveError::Server { .. } => ErrorClass::Transient,
            DriveError::Exhausted { source, .. } => source.class(),
            DriveError::InvalidResponse(_)
            | DriveError::InvalidPath(_)
            | DriveError::Config(_)
            | DriveError::Url(_)
            | DriveError::Report(_)
            | DriveError::Io(_) => ErrorClass::Permanent,
            DriveError::Conflict { .. } | DriveError::Api { .. } | DriveError::Http(_) => ErrorClass::Unclassified,
        }
    }

    /// Graph error code, when the server sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            DriveError::Auth { code, .. }
            | DriveError::RateLimited { code, .. }
            | DriveError::Quota { code, .. }
            | DriveError::NotFound { code, .. }
            | DriveError::Conflict { code, .. }
            | DriveError::Server { code, .. }
            | DriveError::Api { code, .. } => code.as_deref(),
            DriveError::Exhausted { source, .. } => source.code(),
            _ => None,
        }
    }

    /// HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DriveError::Auth { .. } => Some(401),
            DriveError::RateLimited { .. } => Some(429),
            DriveError::Quota { .. } => Some(507),
            DriveError::NotFound { .. } => Some(404),
            DriveError::Conflict { .. } => Some(409),
            DriveError::Server { status, .. } | DriveError::Api { status, .. } => Some(*status),
            DriveError::Http(e) => e.status().map(|s| s.as_u16()),
            DriveError::Exhausted { source, .. } => source.status_code(),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DriveError::Conflict { .. })
    }
}

impl From<Classified<DriveError>> for DriveError {
    fn from(classified: Classified<DriveError>) -> Self {
        if classified.attempts <= 1 {
            classified.error
        } else {
            DriveError::Exhausted {
                attempts: classified.attempts,
                source: Box::new(classified.error),
            }
        }
    }
}

/// `Retry-After` in delay-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn default_message(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "Invalid request",
        401 => "Access token invalid or expired",
        403 => "Access denied, check the application permissions",
        404 => "File or folder not found",
        409 => "Conflict, an item with the same name already exists",
        412 => "Precondition failed",
        413 => "File too large",
        429 => "Too many requests",
        500 => "Internal storage service error",
        502 => "Storage service temporarily unavailable",
        503 => "Storage service unavailable",
        507 => "Insufficient storage",
        _ => "Unexpected storage service error",
    }
}
