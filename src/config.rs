//! Process configuration
//!
//! Built once at startup and handed to the handlers by reference. Missing
//! credentials are a startup error, never a mid-request exit.

use crate::models::ParameterEncoding;
use crate::{Error, Result};
use std::path::PathBuf;

pub const DEFAULT_SAVE_FOLDER: &str = "./output";
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

#[derive(Clone)]
pub struct Config {
    /// Base URL of the generation worker, without a trailing slash.
    pub api_url: String,
    pub api_token: String,
    pub save_folder: PathBuf,
    pub max_dimension: u32,
    pub parameter_encoding: ParameterEncoding,
}

// Hand-written so the token never ends up in a log line.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("api_token", &"***")
            .field("save_folder", &self.save_folder)
            .field("max_dimension", &self.max_dimension)
            .field("parameter_encoding", &self.parameter_encoding)
            .finish()
    }
}

impl Config {
    pub fn new(api_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_url: normalize_base_url(&api_url.into()),
            api_token: api_token.into(),
            save_folder: PathBuf::from(DEFAULT_SAVE_FOLDER),
            max_dimension: DEFAULT_MAX_DIMENSION,
            parameter_encoding: ParameterEncoding::default(),
        }
    }

    pub fn with_save_folder(mut self, save_folder: impl Into<PathBuf>) -> Self {
        self.save_folder = save_folder.into();
        self
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn with_parameter_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.parameter_encoding = encoding;
        self
    }

    /// Load from the process environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests need not touch the real
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{} not set", key)))
        };

        let mut config = Self::new(required("FLUX_API_URL")?, required("FLUX_API_TOKEN")?);

        if let Some(folder) = lookup("FLUX_SAVE_FOLDER").filter(|v| !v.trim().is_empty()) {
            config.save_folder = PathBuf::from(folder.trim());
        }

        if let Some(raw) = lookup("FLUX_MAX_DIMENSION") {
            config.max_dimension = parse_max_dimension(&raw)?;
        }

        if let Some(raw) = lookup("FLUX_PARAMETER_ENCODING") {
            config.parameter_encoding = raw.parse::<ParameterEncoding>().map_err(Error::Config)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(Error::Config("FLUX_API_URL is empty".to_string()));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "FLUX_API_URL must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        if self.api_token.is_empty() {
            return Err(Error::Config("FLUX_API_TOKEN is empty".to_string()));
        }
        if self.max_dimension == 0 {
            return Err(Error::Config(
                "FLUX_MAX_DIMENSION must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_max_dimension(raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            Error::Config(format!(
                "FLUX_MAX_DIMENSION must be a positive integer, got '{}'",
                raw
            ))
        })
}
