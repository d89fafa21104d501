//! OpenAI-compatible Chat Completions adapter.
//!
//! Speaks the chat-completions SSE dialect: text arrives as
//! `choices[0].delta.content`, tool calls as indexed `tool_calls` deltas
//! whose id and name appear only on the first chunk for each index.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::run::RunInput;
use crate::types::{Message, Role};

use super::http::{bearer_headers, parse_sse_data, shared_client, status_to_fault};
use super::{BackendAdapter, Fragment, FragmentStream};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatibleAdapter {
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleAdapter {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Build an adapter from `OPENAI_API_KEY` / `OPENAI_BASE_URL`, loading
    /// `.env` first if present.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| BridgeError::Configuration("Missing OPENAI_API_KEY".into()))?;
        let base_url = std::env::var("OPENAI_BASE_URL").ok();
        Ok(Self::new(model, api_key, base_url))
    }

    fn build_request_body(&self, input: &RunInput) -> serde_json::Value {
        let messages = input
            .messages
            .iter()
            .map(message_to_openai)
            .collect::<Vec<_>>();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        if !input.tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = input
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.as_object_mut()
                .expect("body is an object")
                .insert("tools".into(), tool_defs.into());
        }

        body
    }
}

#[async_trait]
impl BackendAdapter for OpenAiCompatibleAdapter {
    fn backend_name(&self) -> &str {
        "openai"
    }

    async fn open(&self, input: &RunInput) -> Result<FragmentStream> {
        let body = self.build_request_body(input);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, run_id = %input.run_id, "openai open stream");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
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
            // OpenAI correlates continuation chunks by index, not id.
            let mut ids_by_index: HashMap<u64, String> = HashMap::new();
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

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = parse_sse_data(&line) else { continue; };

                    let chunk: ChatStreamChunk = match serde_json::from_str(data) {
                        Ok(chunk) => chunk,
                        Err(_) => {
                            tracing::warn!(data, "skipping unparseable stream chunk");
                            continue;
                        }
                    };

                    if let Some(err) = chunk.error {
                        yield Err(BridgeError::Backend(err.message));
                        return;
                    }

                    let Some(choice) = chunk.choices.into_iter().next() else {
                        continue; // keepalive / usage-only chunk
                    };

                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            yield Ok(Fragment::TextDelta(text));
                        }
                    }

                    for tc in choice.delta.tool_calls.unwrap_or_default() {
                        let id = match tc.id {
                            Some(id) => {
                                ids_by_index.insert(tc.index, id.clone());
                                id
                            }
                            None => match ids_by_index.get(&tc.index) {
                                Some(id) => id.clone(),
                                None => {
                                    yield Err(BridgeError::Backend(format!(
                                        "tool call delta at index {} has no id",
                                        tc.index
                                    )));
                                    return;
                                }
                            },
                        };
                        let function = tc.function.unwrap_or_default();
                        yield Ok(Fragment::ToolCallDelta {
                            id,
                            name: function.name,
                            args_delta: function.arguments.filter(|a| !a.is_empty()),
                        });
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn message_to_openai(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    if msg.role == Role::Tool {
        return serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.text(),
        });
    }

    if let Some(calls) = &msg.tool_calls {
        let tc_json: Vec<serde_json::Value> = calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments.to_string(),
                    }
                })
            })
            .collect();
        return serde_json::json!({
            "role": role,
            "content": msg.content,
            "tool_calls": tc_json,
        });
    }

    serde_json::json!({ "role": role, "content": msg.text() })
}

// Chat-completions stream chunk shapes (internal)

#[derive(Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    #[serde(default)]
    error: Option<ChatStreamError>,
}

#[derive(Deserialize)]
struct ChatStreamError {
    message: String,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
}

#[derive(Deserialize)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCallDelta>>,
}

#[derive(Deserialize)]
struct ChatToolCallDelta {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChatFunctionDelta>,
}

#[derive(Deserialize, Default)]
struct ChatFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
