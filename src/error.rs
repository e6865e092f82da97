//! Crate-level error type
//!
//! Used on setup and serving paths. Per-stream failures have their own types
//! in [`crate::coordinator`], [`crate::upstream`] and [`crate::cache`].

use thiserror::Error;

/// Errors from building or running the proxy
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}

/// Result alias for [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
