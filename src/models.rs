//! Data models and structures
//!
//! Tool arguments as the host sends them, the validated request the handlers
//! work from, and the chat-completions payload sent upstream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_INFERENCE_STEPS: u8 = 4;
pub const MIN_INFERENCE_STEPS: i64 = 1;
pub const MAX_INFERENCE_STEPS: i64 = 4;

/// Aspect ratios the upstream worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "21:9")]
    Ultrawide,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "4:5")]
    Portrait4x5,
    #[serde(rename = "5:4")]
    Landscape5x4,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Vertical,
    #[serde(rename = "9:21")]
    UltraVertical,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 11] = [
        AspectRatio::Square,
        AspectRatio::Widescreen,
        AspectRatio::Ultrawide,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait2x3,
        AspectRatio::Portrait4x5,
        AspectRatio::Landscape5x4,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Vertical,
        AspectRatio::UltraVertical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Ultrawide => "21:9",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Portrait4x5 => "4:5",
            AspectRatio::Landscape5x4 => "5:4",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Vertical => "9:16",
            AspectRatio::UltraVertical => "9:21",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ratio| ratio.as_str() == value)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the aspect ratio reaches the upstream worker.
///
/// Some deployments only honour the ratio when it is written into the prompt
/// text, others expect a structured `aspect_ratio` field.
///
/// Only the ratio moves. `seed`, `num_steps`, `disable_safety_checker`,
/// `width` and `height` are structured fields under either variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterEncoding {
    #[default]
    Structured,
    PromptPrefix,
}

impl FromStr for ParameterEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" => Ok(ParameterEncoding::Structured),
            "prompt-prefix" | "prompt_prefix" | "prompt" => Ok(ParameterEncoding::PromptPrefix),
            other => Err(format!(
                "Invalid parameter encoding '{}'. Expected 'structured' or 'prompt-prefix'",
                other
            )),
        }
    }
}

/// Raw `generate_image` arguments, before any bounds checking.
///
/// Numeric fields are wide signed integers so out-of-range values reach the
/// validator instead of failing inside serde with a less useful message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateImageArgs {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub num_inference_steps: Option<i64>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub disable_safety_checker: Option<bool>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub save_folder: Option<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
}

/// Raw `get_chat_completion` arguments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionArgs {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// A `generate_image` call that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub seed: Option<i64>,
    pub num_inference_steps: u8,
    /// `None` when the caller relied on the default ratio.
    pub aspect_ratio: Option<AspectRatio>,
    pub disable_safety_checker: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_name: Option<String>,
    pub save_folder: Option<PathBuf>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            seed: None,
            num_inference_steps: DEFAULT_INFERENCE_STEPS,
            aspect_ratio: None,
            disable_safety_checker: false,
            width: None,
            height: None,
            file_name: None,
            save_folder: None,
        }
    }

    pub fn resolved_aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio.unwrap_or_default()
    }
}

/// Request body for the upstream chat-completions route.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_steps: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_safety_checker: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Single user turn with no generation parameters.
    pub fn user_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            seed: None,
            num_steps: None,
            aspect_ratio: None,
            disable_safety_checker: None,
            width: None,
            height: None,
            stream: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Successful `get_chat_completion` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionText {
    pub text: String,
}
