//! Core run types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Message, ToolDefinition};

/// Input for one run invocation.
///
/// `thread_id` and `run_id` are caller-assigned opaque identifiers; `run_id`
/// is unique per invocation, `thread_id` may repeat across runs of the same
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    pub thread_id: String,
    pub run_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

impl RunInput {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Finished,
    Errored,
}

/// Result of driving a run to its terminal phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn finished() -> Self {
        Self {
            status: RunStatus::Finished,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Errored,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    pub fn is_errored(&self) -> bool {
        self.status == RunStatus::Errored
    }
}
