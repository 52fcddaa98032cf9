use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("{what} timed out after {limit:?}")]
    Timeout { what: String, limit: Duration },

    #[error("Failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write config file at {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error(
        "No credentials found. Set HELPDESK_EMAIL and HELPDESK_API_TOKEN or run 'helpdesk-export init'"
    )]
    MissingCredentials,

    #[error("No helpdesk URL configured. Set HELPDESK_BASE_URL or HELPDESK_SUBDOMAIN")]
    MissingBaseUrl,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Identity cache at {path} is unreadable: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, ExportError>;
