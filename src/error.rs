//! Error handling and custom error types
//!
//! Every failure a tool call can hit maps onto one of these variants, and each
//! message carries enough context (field, status, URL, path) to act on without
//! a backtrace.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Upstream API error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Could not extract a result from the upstream reply: {0}")]
    Extraction(String),

    #[error("Failed to download image from {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Save folder {path} is not usable: {reason}")]
    Path { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
