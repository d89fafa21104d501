//! Anthropic Messages API adapter.
//!
//! Anthropic frames streamed output as content blocks: a `tool_use` block
//! opens with its id and name, then `input_json_delta` events carry raw
//! argument slices. Both map directly onto tool-call fragments.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::run::RunInput;
use crate::types::{Message, Role};

use super::http::{anthropic_headers, parse_sse_data, shared_client, status_to_fault};
use super::{BackendAdapter, Fragment, FragmentStream};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Build an adapter from `ANTHROPIC_API_KEY` / `ANTHROPIC_BASE_URL`,
    /// loading `.env` first if present.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| BridgeError::Configuration("Missing ANTHROPIC_API_KEY".into()))?;
        let base_url = std::env::var("ANTHROPIC_BASE_URL").ok();
        Ok(Self::new(model, api_key, base_url))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request_body(&self, input: &RunInput) -> serde_json::Value {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut messages: Vec<serde_json::Value> = Vec::new();

        for msg in &input.messages {
            match msg.role {
                Role::System => system_parts.push(msg.text()),
                Role::User => messages.push(serde_json::json!({
                    "role": "user",
                    "content": msg.text(),
                })),
                Role::Assistant => messages.push(assistant_to_anthropic(msg)),
                Role::Tool => messages.push(serde_json::json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id,
                        "content": msg.text(),
                    }],
                })),
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        let obj = body.as_object_mut().expect("body is an object");

        if !system_parts.is_empty() {
            obj.insert("system".into(), system_parts.join("\n").into());
        }

        if !input.tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = input
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
        }

        body
    }
}

#[async_trait]
impl BackendAdapter for AnthropicAdapter {
    fn backend_name(&self) -> &str {
        "anthropic"
    }

    async fn open(&self, input: &RunInput) -> Result<FragmentStream> {
        let body = self.build_request_body(input);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model, run_id = %input.run_id, "anthropic open stream");

        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_fault(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut current_tool_id: Option<String> = None;
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(BridgeError::Network(e));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
                        continue;
                    }

                    let Some(data) = parse_sse_data(&line) else { continue; };
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                        tracing::warn!(data, "skipping unparseable stream event");
                        continue;
                    };

                    let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
                    match event_type {
                        "content_block_start" => {
                            let Some(block) = event.get("content_block") else { continue; };
                            if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                                let id = block.get("id").and_then(|v| v.as_str());
                                let name = block.get("name").and_then(|v| v.as_str());
                                if let (Some(id), Some(name)) = (id, name) {
                                    current_tool_id = Some(id.to_string());
                                    yield Ok(Fragment::tool_call(id, Some(name), None));
                                }
                            }
                        }
                        "content_block_delta" => {
                            let Some(delta) = event.get("delta") else { continue; };
                            match delta.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                                "text_delta" => {
                                    if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                                        if !text.is_empty() {
                                            yield Ok(Fragment::text(text));
                                        }
                                    }
                                }
                                "input_json_delta" => {
                                    let partial = delta
                                        .get("partial_json")
                                        .and_then(|t| t.as_str())
                                        .unwrap_or_default();
                                    if let (Some(id), false) = (&current_tool_id, partial.is_empty()) {
                                        yield Ok(Fragment::tool_call(id.clone(), None, Some(partial)));
                                    }
                                }
                                _ => {}
                            }
                        }
                        "content_block_stop" => {
                            current_tool_id = None;
                        }
                        "error" => {
                            let message = event
                                .get("error")
                                .and_then(|e| e.get("message"))
                                .and_then(|m| m.as_str())
                                .unwrap_or("stream error")
                                .to_string();
                            yield Err(BridgeError::Backend(message));
                            return;
                        }
                        "message_stop" => {
                            return;
                        }
                        _ => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn assistant_to_anthropic(msg: &Message) -> serde_json::Value {
    let Some(calls) = &msg.tool_calls else {
        return serde_json::json!({
            "role": "assistant",
            "content": msg.text(),
        });
    };

    let mut content: Vec<serde_json::Value> = Vec::new();
    if let Some(text) = &msg.content {
        if !text.is_empty() {
            content.push(serde_json::json!({"type": "text", "text": text}));
        }
    }
    for tc in calls {
        content.push(serde_json::json!({
            "type": "tool_use",
            "id": tc.id,
            "name": tc.name,
            "input": tc.arguments,
        }));
    }

    serde_json::json!({
        "role": "assistant",
        "content": content,
    })
}
