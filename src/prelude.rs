//! Convenience re-exports for common use.

pub use crate::backend::{BackendAdapter, Fragment, FragmentStream};
pub use crate::error::{BridgeError, Result};
pub use crate::run::{
    CounterMessageIds, MessageIdSource, RunInput, RunOutcome, RunStateMachine, RunStatus,
    UuidMessageIds,
};
pub use crate::sink::{ChannelSink, ChannelSinkHandle, CollectingSink, EventSink, SinkOutcome};
pub use crate::types::{Event, Message, Role, ToolCall, ToolDefinition};
