//! Backend adapter trait and implementations.
//!
//! An adapter translates the canonical thread and tool definitions into a
//! backend-specific request and translates the backend's streaming output
//! back into [`Fragment`]s. Adapters deal only in fragments; AG-UI event
//! framing is the run state machine's concern.

pub mod http;
pub mod scripted;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "openai")]
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{BridgeError, Result};
use crate::run::RunInput;

/// One incremental unit of backend output.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// A chunk of assistant text.
    TextDelta(String),
    /// A chunk of a tool call. `name` is present on the first delta for a
    /// given id; `args_delta` carries a raw slice of the JSON arguments.
    ToolCallDelta {
        id: String,
        name: Option<String>,
        args_delta: Option<String>,
    },
}

impl Fragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextDelta(delta.into())
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: Option<&str>,
        args_delta: Option<&str>,
    ) -> Self {
        Self::ToolCallDelta {
            id: id.into(),
            name: name.map(str::to_string),
            args_delta: args_delta.map(str::to_string),
        }
    }
}

/// Lazy sequence of fragments produced by one backend invocation.
///
/// An `Err` item is terminal by contract: adapters yield at most one fault
/// and nothing after it, so the consumer can always distinguish "stream
/// ended normally" from "stream ended due to fault".
pub type FragmentStream = BoxStream<'static, std::result::Result<Fragment, BridgeError>>;

/// Capability trait implemented per backend.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Backend name (e.g. "openai", "anthropic"), used for logging.
    fn backend_name(&self) -> &str;

    /// Open a fragment stream for one run. Emission order of the backend is
    /// preserved exactly.
    async fn open(&self, input: &RunInput) -> Result<FragmentStream>;
}
