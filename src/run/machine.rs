//! The run state machine.
//!
//! Drives a single run from `RUN_STARTED` to a terminal event, folding the
//! adapter's fragment sequence into framed messages and tool calls. Event
//! order exactly mirrors fragment arrival order; all state transitions are
//! observable only through the emitted events.

use std::collections::HashSet;

use futures::StreamExt;
use tracing::debug;

use crate::backend::{BackendAdapter, Fragment};
use crate::error::{BridgeError, Result};
use crate::sink::EventSink;
use crate::types::{validate_thread, Event};

use super::ids::{MessageIdSource, UuidMessageIds};
use super::types::{RunInput, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Streaming,
    Finished,
    Errored,
}

/// State machine for exactly one run.
///
/// Holds the transient run state: the current message identifier, whether a
/// message is open, the open tool call (at most one), and the set of closed
/// tool-call ids. A second `start` on the same instance is rejected.
pub struct RunStateMachine<I: MessageIdSource = UuidMessageIds> {
    ids: I,
    phase: Phase,
    message_id: String,
    message_open: bool,
    message_ever_closed: bool,
    open_tool_call: Option<String>,
    closed_tool_calls: HashSet<String>,
}

impl RunStateMachine<UuidMessageIds> {
    /// Create a state machine with random message identifiers.
    pub fn new() -> Self {
        Self::with_ids(UuidMessageIds)
    }
}

impl Default for RunStateMachine<UuidMessageIds> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MessageIdSource> RunStateMachine<I> {
    /// Create a state machine with an injected identifier source.
    pub fn with_ids(ids: I) -> Self {
        Self {
            ids,
            phase: Phase::Idle,
            message_id: String::new(),
            message_open: false,
            message_ever_closed: false,
            open_tool_call: None,
            closed_tool_calls: HashSet::new(),
        }
    }

    /// Drive one run to its terminal phase.
    ///
    /// A thread that fails validation is rejected synchronously with
    /// `MalformedThread` and nothing is emitted. Every fault after
    /// `RUN_STARTED` is surfaced as a `RUN_ERROR` event followed by
    /// `sink.fail` and reported in the returned outcome, never as `Err`:
    /// the event stream is the frontend's only channel of truth.
    pub async fn start(
        &mut self,
        input: RunInput,
        adapter: &dyn BackendAdapter,
        sink: &dyn EventSink,
    ) -> Result<RunOutcome> {
        match self.phase {
            Phase::Idle => {}
            Phase::Streaming => return Err(BridgeError::AlreadyStarted),
            Phase::Finished | Phase::Errored => return Err(BridgeError::AlreadyTerminated),
        }
        validate_thread(&input.messages)?;

        self.phase = Phase::Streaming;
        self.message_id = self.ids.next_message_id();

        debug!(
            thread_id = %input.thread_id,
            run_id = %input.run_id,
            backend = adapter.backend_name(),
            "run started"
        );

        if let Err(err) = sink.push(Event::run_started(&input.thread_id, &input.run_id)) {
            return Ok(self.fail_run(sink, err));
        }

        let mut fragments = match adapter.open(&input).await {
            Ok(stream) => stream,
            Err(err) => return Ok(self.fail_run(sink, err)),
        };

        loop {
            // Cancellation is cooperative: observed here, once per fragment
            // boundary, before the next pull.
            if sink.is_cancelled() {
                return Ok(self.fail_run(sink, BridgeError::Cancelled));
            }

            let Some(item) = fragments.next().await else {
                break;
            };

            let step = match item {
                Ok(Fragment::TextDelta(text)) => self.on_text_delta(sink, text),
                Ok(Fragment::ToolCallDelta {
                    id,
                    name,
                    args_delta,
                }) => self.on_tool_call_delta(sink, id, name, args_delta),
                Err(fault) => Err(fault),
            };

            if let Err(err) = step {
                return Ok(self.fail_run(sink, err));
            }
        }

        if let Err(err) = self.finish(sink, &input) {
            return Ok(self.fail_run(sink, err));
        }

        self.phase = Phase::Finished;
        sink.complete();
        debug!(run_id = %input.run_id, "run finished");
        Ok(RunOutcome::finished())
    }

    fn on_text_delta(&mut self, sink: &dyn EventSink, text: String) -> Result<()> {
        // Content deltas are non-empty; an empty chunk is a no-op and must
        // not force framing boundaries.
        if text.is_empty() {
            return Ok(());
        }

        if let Some(id) = self.open_tool_call.take() {
            sink.push(Event::tool_call_end(&id))?;
            self.closed_tool_calls.insert(id);
        }

        if !self.message_open {
            // A re-opened message gets a fresh identifier; consumers treat
            // an ended message id as sealed.
            if self.message_ever_closed {
                self.message_id = self.ids.next_message_id();
            }
            sink.push(Event::text_message_start(&self.message_id))?;
            self.message_open = true;
        }

        sink.push(Event::text_message_content(&self.message_id, text))
    }

    fn on_tool_call_delta(
        &mut self,
        sink: &dyn EventSink,
        id: String,
        name: Option<String>,
        args_delta: Option<String>,
    ) -> Result<()> {
        if self.message_open {
            sink.push(Event::text_message_end(&self.message_id))?;
            self.message_open = false;
            self.message_ever_closed = true;
        }

        let already_open = self.open_tool_call.as_deref() == Some(id.as_str());
        if !already_open {
            if self.closed_tool_calls.contains(&id) {
                return Err(BridgeError::ProtocolViolation(format!(
                    "tool call '{id}' reopened after close; interleaved tool calls are not supported"
                )));
            }
            // A delta for a new id implicitly closes the previous call.
            if let Some(prev) = self.open_tool_call.take() {
                sink.push(Event::tool_call_end(&prev))?;
                self.closed_tool_calls.insert(prev);
            }
            let Some(name) = name else {
                return Err(BridgeError::ProtocolViolation(format!(
                    "first delta for tool call '{id}' carries no name"
                )));
            };
            sink.push(Event::tool_call_start(&id, &name, &self.message_id))?;
            self.open_tool_call = Some(id.clone());
        }

        if let Some(args) = args_delta {
            if !args.is_empty() {
                sink.push(Event::tool_call_args(&id, args))?;
            }
        }

        Ok(())
    }

    /// Normal exhaustion: close any open unit, then frame the run finished.
    fn finish(&mut self, sink: &dyn EventSink, input: &RunInput) -> Result<()> {
        if let Some(id) = self.open_tool_call.take() {
            sink.push(Event::tool_call_end(&id))?;
            self.closed_tool_calls.insert(id);
        }
        if self.message_open {
            sink.push(Event::text_message_end(&self.message_id))?;
            self.message_open = false;
        }
        sink.push(Event::run_finished(&input.thread_id, &input.run_id))
    }

    /// Fault path: one `RUN_ERROR`, no closing events for open units; the
    /// error event itself signals the abnormal truncation.
    fn fail_run(&mut self, sink: &dyn EventSink, err: BridgeError) -> RunOutcome {
        let message = err.to_string();
        // Best effort: the sink may be the thing that failed.
        let _ = sink.push(Event::run_error(&message));
        self.phase = Phase::Errored;
        sink.fail(&err);
        debug!(error = %message, "run errored");
        RunOutcome::errored(message)
    }
}
