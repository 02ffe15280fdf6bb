use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type. The remote-facing variants mirror the failure
/// kinds of the Confluence REST surface; `retryable()` is what the client's
/// retry wrapper consults.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited by remote")]
    RateLimited { retry_after: Option<u64> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Giving up after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("Found {} broken link(s)", .0.len())]
    BrokenLinks(Vec<String>),

    #[error("{0}")]
    Generic(String),
}

impl Error {
    pub fn new(msg: impl Into<String>) -> Self {
        Error::Generic(msg.into())
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn broken_links(links: Vec<String>) -> Self {
        Error::BrokenLinks(links)
    }

    /// Whether the retry wrapper is allowed to re-issue the request that
    /// produced this error.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::Network(_) | Error::Server { .. }
        )
    }

    /// Process exit code surfaced by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::Validation(_) => 2,
            Error::Auth(_) => 3,
            Error::Network(_) | Error::MaxRetriesExceeded { .. } => 4,
            Error::Forbidden(_)
            | Error::NotFound(_)
            | Error::Conflict(_)
            | Error::RateLimited { .. }
            | Error::Server { .. } => 5,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Generic(err.to_string())
    }
}
