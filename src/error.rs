//! Error taxonomy.
//!
//! Two failure classes with very different blast radii:
//!   - [`ConfigError`]: startup problems (missing or malformed settings,
//!     schema files, credentials). Fatal; the process exits with a clear
//!     message before any work is dispatched.
//!   - [`ClientError`] / [`ItemError`]: per-item problems during a batch.
//!     Logged with the item identity and skipped; no artifact is written, so
//!     the item stays eligible for the next run.

use std::path::PathBuf;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Startup configuration failures. All of these abort the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse schema {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("DASHSCOPE_API_KEY is not set")]
    MissingApiKey,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// ClientError
// ---------------------------------------------------------------------------

/// Errors from one request/response exchange with the inference service.
///
/// Rate limiting (HTTP 429) is kept distinguishable from generic API
/// failures; both are treated as retryable-by-future-run by the dispatcher,
/// which never retries in-process.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("service returned no caption text")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// ItemError
// ---------------------------------------------------------------------------

/// Anything that can go wrong while processing a single work item.
///
/// None of these abort the batch.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
