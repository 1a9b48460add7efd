//! Parameter validation for incoming tool calls.
//!
//! Runs before any network I/O. A rejected call never reaches the upstream
//! worker.

use crate::config::Config;
use crate::models::{
    AspectRatio, ChatCompletionArgs, GenerateImageArgs, GenerationRequest, MAX_INFERENCE_STEPS,
    MIN_INFERENCE_STEPS,
};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Decode raw tool arguments, reporting type mismatches as validation errors.
pub fn decode_args<T: DeserializeOwned + Default>(args: Option<serde_json::Value>) -> Result<T> {
    match args {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| Error::validation("arguments", e.to_string())),
    }
}

pub fn validate_prompt(prompt: Option<&str>) -> Result<String> {
    match prompt {
        Some(p) if !p.is_empty() => Ok(p.to_string()),
        Some(_) => Err(Error::validation("prompt", "must not be empty")),
        None => Err(Error::validation("prompt", "is required")),
    }
}

pub fn validate_generation(args: GenerateImageArgs, config: &Config) -> Result<GenerationRequest> {
    let prompt = validate_prompt(args.prompt.as_deref())?;
    let mut request = GenerationRequest::new(prompt);

    request.seed = args.seed;

    if let Some(steps) = args.num_inference_steps {
        if !(MIN_INFERENCE_STEPS..=MAX_INFERENCE_STEPS).contains(&steps) {
            return Err(Error::validation(
                "num_inference_steps",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_INFERENCE_STEPS, MAX_INFERENCE_STEPS, steps
                ),
            ));
        }
        request.num_inference_steps = steps as u8;
    }

    if let Some(raw) = args.aspect_ratio.as_deref() {
        let ratio = AspectRatio::parse(raw.trim()).ok_or_else(|| {
            let allowed: Vec<&str> = AspectRatio::ALL.iter().map(|r| r.as_str()).collect();
            Error::validation(
                "aspect_ratio",
                format!("'{}' is not one of {}", raw, allowed.join(", ")),
            )
        })?;
        request.aspect_ratio = Some(ratio);
    }

    request.disable_safety_checker = args.disable_safety_checker.unwrap_or(false);
    request.width = validate_dimension("width", args.width, config.max_dimension)?;
    request.height = validate_dimension("height", args.height, config.max_dimension)?;

    if let Some(name) = args.file_name.as_deref().filter(|n| !n.trim().is_empty()) {
        request.file_name = Some(sanitize_file_name(name)?);
    }

    request.save_folder = args
        .save_folder
        .filter(|folder| !folder.trim().is_empty())
        .map(PathBuf::from);

    Ok(request)
}

pub fn validate_chat(args: ChatCompletionArgs) -> Result<String> {
    validate_prompt(args.prompt.as_deref())
}

fn validate_dimension(field: &str, value: Option<i64>, max: u32) -> Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(v) if v <= 0 => Err(Error::validation(
            field,
            format!("must be a positive integer, got {}", v),
        )),
        Some(v) if v > i64::from(max) => Err(Error::validation(
            field,
            format!("must not exceed {}, got {}", max, v),
        )),
        Some(v) => Ok(Some(v as u32)),
    }
}

/// Keep only the final path component so a name cannot escape the save folder.
///
/// Dot-files such as `.png` are refused: they have no stem to save under.
fn sanitize_file_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    Path::new(trimmed)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .filter(|n| !n.is_empty() && !n.starts_with('.'))
        .ok_or_else(|| {
            Error::validation("file_name", format!("'{}' is not a usable file name", name))
        })
}
