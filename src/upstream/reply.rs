//! Interpretation of upstream replies.
//!
//! The worker answers either with a bare `{ "url": ... }` object or with an
//! OpenAI-style chat completion whose message content embeds the image as a
//! markdown link. Shapes are tried in that order.

use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static MARKDOWN_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#)
        .expect("markdown image pattern is a valid regex")
});

/// Recognised reply shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamReply {
    DirectUrl { url: String },
    ChatContent { text: String },
    Unrecognized,
}

impl UpstreamReply {
    pub fn from_value(value: &Value) -> Self {
        if let Some(url) = value
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            return UpstreamReply::DirectUrl {
                url: url.to_string(),
            };
        }

        match first_message_content(value) {
            Some(text) => UpstreamReply::ChatContent { text },
            None => UpstreamReply::Unrecognized,
        }
    }

    /// The image locator carried by this reply.
    pub fn image_locator(&self) -> Result<String> {
        match self {
            UpstreamReply::DirectUrl { url } => Ok(url.clone()),
            UpstreamReply::ChatContent { text } => {
                find_markdown_image(text).map(str::to_string).ok_or_else(|| {
                    Error::Extraction(format!(
                        "message content has no markdown image link: {}",
                        preview(text)
                    ))
                })
            }
            UpstreamReply::Unrecognized => Err(Error::Extraction(
                "reply has neither a 'url' field nor choices[0].message.content".to_string(),
            )),
        }
    }
}

/// First `![alt](url)` target in `text`.
pub fn find_markdown_image(text: &str) -> Option<&str> {
    MARKDOWN_IMAGE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Text of the first choice, or the whole reply serialized when there is none.
pub fn completion_text(value: &Value) -> String {
    first_message_content(value).unwrap_or_else(|| {
        tracing::warn!("Upstream reply has no message content, returning it verbatim");
        value.to_string()
    })
}

fn first_message_content(value: &Value) -> Option<String> {
    let content = value
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;

    match content {
        Value::String(text) => Some(text.clone()),
        // Multi-part content: keep the text parts in order.
        Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            (!text.is_empty()).then(|| text.join("\n"))
        }
        _ => None,
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 200;
    if text.chars().count() > MAX_CHARS {
        let truncated: String = text.chars().take(MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_url_shape() {
        let reply = UpstreamReply::from_value(&json!({ "url": "http://x/y.png" }));
        assert_eq!(
            reply,
            UpstreamReply::DirectUrl {
                url: "http://x/y.png".to_string()
            }
        );
        assert_eq!(reply.image_locator().unwrap(), "http://x/y.png");
    }

    #[test]
    fn test_markdown_fallback() {
        let reply = UpstreamReply::from_value(&json!({
            "choices": [{ "message": { "content": "![img](http://x/y.png)" } }]
        }));
        assert_eq!(reply.image_locator().unwrap(), "http://x/y.png");
    }

    #[test]
    fn test_direct_url_wins_over_chat_content() {
        let reply = UpstreamReply::from_value(&json!({
            "url": "http://first/a.png",
            "choices": [{ "message": { "content": "![img](http://second/b.png)" } }]
        }));
        assert_eq!(reply.image_locator().unwrap(), "http://first/a.png");
    }

    #[test]
    fn test_first_markdown_match_is_taken() {
        let text = "Here you go:\n![one](https://cdn/1.png \"title\")\nand ![two](https://cdn/2.png)";
        assert_eq!(find_markdown_image(text), Some("https://cdn/1.png"));
        assert_eq!(find_markdown_image("![](<https://cdn/3.png>)"), Some("https://cdn/3.png"));
    }

    #[test]
    fn test_plain_link_is_not_an_image() {
        assert_eq!(find_markdown_image("[link](https://cdn/1.png)"), None);

        let reply = UpstreamReply::from_value(&json!({
            "choices": [{ "message": { "content": "sorry, no image today" } }]
        }));
        let err = reply.image_locator().unwrap_err();
        assert!(matches!(err, Error::Extraction(ref msg) if msg.contains("sorry")));
    }

    #[test]
    fn test_unrecognized_shapes() {
        for value in [
            json!({}),
            json!({ "url": "" }),
            json!({ "url": 42 }),
            json!({ "choices": [] }),
            json!({ "choices": [{ "message": {} }] }),
            json!("just a string"),
        ] {
            let reply = UpstreamReply::from_value(&value);
            assert_eq!(reply, UpstreamReply::Unrecognized, "value: {}", value);
            assert!(matches!(reply.image_locator(), Err(Error::Extraction(_))));
        }
    }

    #[test]
    fn test_completion_text_prefers_message_content() {
        let value = json!({ "choices": [{ "message": { "content": "Hello there" } }] });
        assert_eq!(completion_text(&value), "Hello there");
    }

    #[test]
    fn test_completion_text_joins_content_parts() {
        let value = json!({ "choices": [{ "message": { "content": [
            { "type": "text", "text": "part one" },
            { "type": "text", "text": "part two" }
        ] } }] });
        assert_eq!(completion_text(&value), "part one\npart two");
    }

    #[test]
    fn test_completion_text_falls_back_to_raw_reply() {
        let value = json!({ "result": "something else" });
        assert_eq!(completion_text(&value), r#"{"result":"something else"}"#);
    }
}
