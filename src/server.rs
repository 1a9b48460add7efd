//! Tool server
//!
//! Exposes `generate_image` and `get_chat_completion` to the host over
//! line-delimited JSON-RPC 2.0 on stdio. Only the handful of methods a tool
//! host needs are answered.
//!
//! Each request runs on its own task; replies are written in completion
//! order, so a `ping` is never stuck behind a slow generation.

use crate::config::Config;
use crate::envelope::ResultEnvelope;
use crate::handlers;
use crate::models::{AspectRatio, DEFAULT_INFERENCE_STEPS, MAX_INFERENCE_STEPS, MIN_INFERENCE_STEPS};
use crate::upstream::UpstreamClient;
use crate::validate::decode_args;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "flux-mcp";
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Result of one tool invocation, as the host expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub content: Vec<TextContent>,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub content_type: &'static str,
    pub text: String,
}

impl ToolOutput {
    fn structured(value: Value, is_error: bool) -> Self {
        Self {
            content: vec![TextContent {
                content_type: "text",
                text: value.to_string(),
            }],
            structured_content: Some(value),
            is_error,
        }
    }

    fn error(message: String) -> Self {
        Self {
            content: vec![TextContent {
                content_type: "text",
                text: message,
            }],
            structured_content: None,
            is_error: true,
        }
    }
}

pub struct ToolServer {
    config: Config,
    upstream: UpstreamClient,
}

impl ToolServer {
    pub fn new(config: Config) -> Self {
        let upstream = UpstreamClient::new(&config);
        Self { config, upstream }
    }

    /// Tool catalogue with JSON schemas for the arguments.
    pub fn tools(&self) -> Value {
        json!([
            {
                "name": "generate_image",
                "description": "Generate an image from a text prompt. Returns the image URL and, when file_name is given, the paths it was saved to.",
                "inputSchema": self.generate_image_schema()
            },
            {
                "name": "get_chat_completion",
                "description": "Send a single-turn prompt to the model and return its text answer.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string", "minLength": 1 }
                    },
                    "required": ["prompt"]
                }
            }
        ])
    }

    fn generate_image_schema(&self) -> Value {
        let ratios: Vec<&str> = AspectRatio::ALL.iter().map(|r| r.as_str()).collect();
        let max = self.config.max_dimension;

        let mut properties = serde_json::Map::new();
        properties.insert(
            "prompt".into(),
            json!({ "type": "string", "minLength": 1, "description": "Text description of the image" }),
        );
        properties.insert(
            "seed".into(),
            json!({ "type": "integer", "description": "Seed for reproducible output" }),
        );
        properties.insert(
            "num_inference_steps".into(),
            json!({
                "type": "integer",
                "minimum": MIN_INFERENCE_STEPS,
                "maximum": MAX_INFERENCE_STEPS,
                "default": DEFAULT_INFERENCE_STEPS
            }),
        );
        properties.insert(
            "aspect_ratio".into(),
            json!({ "type": "string", "enum": ratios, "default": AspectRatio::default().as_str() }),
        );
        properties.insert(
            "disable_safety_checker".into(),
            json!({ "type": "boolean", "default": false }),
        );
        properties.insert(
            "file_name".into(),
            json!({
                "type": "string",
                "description": "Save the image under this name (.png, .jpg or .jpeg; .png by default)"
            }),
        );
        properties.insert(
            "save_folder".into(),
            json!({
                "type": "string",
                "description": "Folder to save into",
                "default": self.config.save_folder.to_string_lossy()
            }),
        );
        properties.insert(
            "width".into(),
            json!({ "type": "integer", "minimum": 1, "maximum": max }),
        );
        properties.insert(
            "height".into(),
            json!({ "type": "integer", "minimum": 1, "maximum": max }),
        );

        json!({
            "type": "object",
            "properties": properties,
            "required": ["prompt"]
        })
    }

    /// Run a tool by name. `None` means the tool does not exist.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Option<ToolOutput> {
        info!("Tool call: {}", name);
        match name {
            "generate_image" => {
                let envelope = match decode_args(arguments) {
                    Ok(args) => handlers::generate_image(&self.upstream, &self.config, args).await,
                    Err(e) => ResultEnvelope::failure(&e),
                };
                let is_error = !envelope.success;
                let value = serde_json::to_value(&envelope).unwrap_or_else(|e| {
                    json!({ "success": false, "error": e.to_string(), "url": null, "images": [], "warning": null })
                });
                Some(ToolOutput::structured(value, is_error))
            }
            "get_chat_completion" => {
                let result = match decode_args(arguments) {
                    Ok(args) => handlers::get_chat_completion(&self.upstream, args).await,
                    Err(e) => Err(e),
                };
                Some(match result.and_then(|text| Ok(serde_json::to_value(text)?)) {
                    Ok(value) => ToolOutput::structured(value, false),
                    Err(e) => {
                        warn!("get_chat_completion failed: {}", e);
                        ToolOutput::error(e.to_string())
                    }
                })
            }
            _ => None,
        }
    }

    /// Handle one JSON-RPC frame. Notifications produce no reply.
    pub async fn handle_message(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(line) {
            Err(e) => Some(RpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            )),
            Ok(value) => self.dispatch(value).await,
        }?;

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Failed to serialize response: {}", e);
                None
            }
        }
    }

    async fn dispatch(&self, value: Value) -> Option<RpcResponse> {
        let id_hint = value.get("id").cloned();
        let request: RpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(RpcResponse::error(
                    id_hint.unwrap_or(Value::Null),
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ))
            }
        };

        if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
            debug!("Peer sent jsonrpc version {:?}", request.jsonrpc);
        }

        let Some(id) = request.id else {
            debug!("Notification: {}", request.method);
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => {
                let protocol_version = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_PROTOCOL_VERSION)
                    .to_string();
                RpcResponse::result(
                    id,
                    json!({
                        "protocolVersion": protocol_version,
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }
                    }),
                )
            }
            "ping" => RpcResponse::result(id, json!({})),
            "tools/list" => RpcResponse::result(id, json!({ "tools": self.tools() })),
            "tools/call" => {
                let params: CallToolParams =
                    match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                        Ok(params) => params,
                        Err(e) => {
                            return Some(RpcResponse::error(
                                id,
                                INVALID_PARAMS,
                                format!("Invalid tools/call params: {}", e),
                            ))
                        }
                    };
                match self.call_tool(&params.name, params.arguments).await {
                    Some(output) => match serde_json::to_value(output) {
                        Ok(result) => RpcResponse::result(id, result),
                        Err(e) => RpcResponse::error(id, INVALID_PARAMS, e.to_string()),
                    },
                    None => RpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        format!("Unknown tool: {}", params.name),
                    ),
                }
            }
            other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        };

        Some(response)
    }

    /// Serve frames from `reader` until EOF, one reply line per request.
    ///
    /// Requests are dispatched concurrently. After EOF the loop keeps writing
    /// until every in-flight request has answered.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (reply_tx, mut replies) = mpsc::unbounded_channel::<String>();
        let mut reply_tx = Some(reply_tx);
        let mut lines = reader.lines();

        loop {
            tokio::select! {
                line = lines.next_line(), if reply_tx.is_some() => {
                    let Some(line) = line? else {
                        info!("Input closed, draining in-flight requests");
                        reply_tx = None;
                        continue;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let Some(tx) = reply_tx.clone() else { continue };
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Some(reply) = server.handle_message(&line).await {
                            // Receiver only goes away when serve itself failed.
                            let _ = tx.send(reply);
                        }
                    });
                }
                Some(reply) = replies.recv() => {
                    writer.write_all(reply.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                else => break,
            }
        }

        info!("All requests answered, shutting down");
        Ok(())
    }

    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn server() -> ToolServer {
        ToolServer::new(Config::new("http://127.0.0.1:9", "token"))
    }

    async fn roundtrip(server: &ToolServer, request: Value) -> Value {
        let reply = server.handle_message(&request.to_string()).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_echoes_protocol_version() {
        let reply = roundtrip(
            &server(),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "protocolVersion": "2025-03-26" } }),
        )
        .await;

        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(reply["result"]["serverInfo"]["name"], "flux-mcp");
    }

    #[tokio::test]
    async fn test_tools_list_names_both_tools() {
        let reply = roundtrip(
            &server(),
            json!({ "jsonrpc": "2.0", "id": "a", "method": "tools/list" }),
        )
        .await;

        let names: Vec<&str> = reply["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["generate_image", "get_chat_completion"]);

        let schema = &reply["result"]["tools"][0]["inputSchema"];
        assert_eq!(schema["properties"]["num_inference_steps"]["maximum"], 4);
        assert_eq!(schema["properties"]["width"]["maximum"], 1024);
        assert_eq!(schema["properties"]["aspect_ratio"]["enum"].as_array().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_notification_gets_no_reply() {
        let reply = server()
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = server();

        let reply: Value = serde_json::from_str(&server.handle_message("{oops").await.unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], PARSE_ERROR);
        assert_eq!(reply["id"], Value::Null);

        let reply = roundtrip(&server, json!({ "jsonrpc": "2.0", "id": 2, "method": "resources/list" })).await;
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);

        let reply = roundtrip(
            &server,
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": { "name": "nope" } }),
        )
        .await;
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);
        assert!(reply["error"]["message"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_invalid_generate_image_arguments_return_envelope() {
        let output = server()
            .call_tool("generate_image", Some(json!({ "prompt": "" })))
            .await
            .unwrap();

        assert!(output.is_error);
        let envelope = output.structured_content.unwrap();
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["url"], Value::Null);
        assert_eq!(envelope["images"], json!([]));
        assert!(envelope["error"].as_str().unwrap().contains("prompt"));
    }

    #[tokio::test]
    async fn test_invalid_chat_arguments_are_tool_errors() {
        let output = server()
            .call_tool("get_chat_completion", Some(json!({ "prompt": 12 })))
            .await
            .unwrap();

        assert!(output.is_error);
        assert!(output.structured_content.is_none());
        assert!(output.content[0].text.starts_with("Invalid parameter 'arguments'"));
    }

    #[tokio::test]
    async fn test_serve_writes_one_line_per_request() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n"
        );
        let mut output = Vec::new();

        Arc::new(server()).serve(input.as_bytes(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let mut replies: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        replies.sort_by_key(|reply| reply["id"].as_i64());
        assert_eq!(
            replies,
            vec![
                json!({ "jsonrpc": "2.0", "id": 1, "result": {} }),
                json!({ "jsonrpc": "2.0", "id": 2, "result": {} }),
            ]
        );
    }

    #[tokio::test]
    async fn test_slow_generation_does_not_block_ping() {
        use std::time::Duration;
        use tokio::io::BufReader;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "url": "http://x/y.png" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&upstream)
            .await;

        let server = Arc::new(ToolServer::new(Config::new(upstream.uri(), "token")));
        let (host, server_end) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_end);
        let serving = tokio::spawn(server.serve(BufReader::new(server_read), server_write));

        let (host_read, mut host_write) = tokio::io::split(host);
        let generate = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "generate_image", "arguments": { "prompt": "fox" } }
        });
        let ping = json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" });
        host_write
            .write_all(format!("{}\n{}\n", generate, ping).as_bytes())
            .await
            .unwrap();

        let mut replies = BufReader::new(host_read).lines();
        let first: Value = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], 2);

        let second: Value =
            serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["id"], 1);
        assert_eq!(second["result"]["structuredContent"]["success"], true);
        assert_eq!(second["result"]["structuredContent"]["url"], "http://x/y.png");

        host_write.shutdown().await.unwrap();
        serving.await.unwrap().unwrap();
        assert!(replies.next_line().await.unwrap().is_none());
    }
}
