//! Crate-wide error types.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signal delivery failed: {0}")]
    Signal(String),

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    pub fn signal(msg: impl Into<String>) -> Self {
        Self::Signal(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
