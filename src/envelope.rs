//! Uniform reply shape for `generate_image`.
//!
//! Every field is always serialized, `null` or `[]` when it has no value, so
//! the host renders success and failure the same way.

use crate::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub success: bool,
    pub error: Option<String>,
    pub url: Option<String>,
    pub images: Vec<String>,
    pub warning: Option<String>,
}

impl ResultEnvelope {
    pub fn success(url: impl Into<String>, images: Vec<String>, warning: Option<String>) -> Self {
        Self {
            success: true,
            error: None,
            url: Some(url.into()),
            images,
            warning,
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            url: None,
            images: Vec::new(),
            warning: None,
        }
    }

    /// Failure that happened after a locator was already known.
    pub fn failure_with_url(error: &Error, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::failure(error)
        }
    }
}
