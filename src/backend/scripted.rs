//! Scripted adapter for tests and dry runs.
//!
//! Produces the exact same fragment sequence a real adapter would, so every
//! layer above the adapter boundary can be exercised without HTTP.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{BridgeError, Result};
use crate::run::RunInput;

use super::{BackendAdapter, Fragment, FragmentStream};

/// One scripted step.
#[derive(Debug, Clone)]
pub enum ScriptItem {
    /// Emit a text delta.
    Text(String),
    /// Emit a tool-call delta.
    ToolCall {
        id: String,
        name: Option<String>,
        args_delta: Option<String>,
    },
    /// Terminate the stream with a fault.
    Fault(String),
    /// Delay before the next item (for timing tests).
    Delay { ms: u64 },
}

/// Adapter that replays a pre-programmed fragment sequence.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAdapter {
    items: Vec<ScriptItem>,
}

impl ScriptedAdapter {
    pub fn new(items: Vec<ScriptItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl BackendAdapter for ScriptedAdapter {
    fn backend_name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, _input: &RunInput) -> Result<FragmentStream> {
        let items = self.items.clone();
        let stream = async_stream::stream! {
            for item in items {
                match item {
                    ScriptItem::Text(text) => yield Ok(Fragment::TextDelta(text)),
                    ScriptItem::ToolCall { id, name, args_delta } => {
                        yield Ok(Fragment::ToolCallDelta { id, name, args_delta });
                    }
                    ScriptItem::Fault(message) => {
                        yield Err(BridgeError::Backend(message));
                        return;
                    }
                    ScriptItem::Delay { ms } => {
                        sleep(Duration::from_millis(ms)).await;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Built-in scripts for common scenarios.
pub mod fixtures {
    use super::*;

    /// Text streamed in chunks.
    pub fn streaming_text(chunks: &[&str]) -> ScriptedAdapter {
        let items = chunks
            .iter()
            .map(|c| ScriptItem::Text((*c).to_string()))
            .collect();
        ScriptedAdapter::new(items)
    }

    /// One tool call: name on the first delta, then argument chunks.
    pub fn tool_call(id: &str, name: &str, args_chunks: &[&str]) -> ScriptedAdapter {
        let mut items = Vec::with_capacity(args_chunks.len().max(1));
        let mut first = true;
        for chunk in args_chunks {
            items.push(ScriptItem::ToolCall {
                id: id.to_string(),
                name: first.then(|| name.to_string()),
                args_delta: Some((*chunk).to_string()),
            });
            first = false;
        }
        if items.is_empty() {
            items.push(ScriptItem::ToolCall {
                id: id.to_string(),
                name: Some(name.to_string()),
                args_delta: None,
            });
        }
        ScriptedAdapter::new(items)
    }

    /// Text, then a terminal fault.
    pub fn fault_mid_stream(text_before: &str, fault: &str) -> ScriptedAdapter {
        ScriptedAdapter::new(vec![
            ScriptItem::Text(text_before.to_string()),
            ScriptItem::Fault(fault.to_string()),
        ])
    }
}
