//! Channel-backed event sink.

use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::types::Event;

use super::{EventSink, SinkOutcome};

/// Production sink: events over an unbounded channel, the terminal signal
/// over a oneshot, cancellation via a shared token.
pub struct ChannelSink {
    events: mpsc::UnboundedSender<Event>,
    outcome: Mutex<Option<oneshot::Sender<SinkOutcome>>>,
    cancel: CancellationToken,
}

impl ChannelSink {
    /// Create a sink and the consumer-side handle it feeds.
    pub fn new() -> (Self, ChannelSinkHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        (
            Self {
                events: event_tx,
                outcome: Mutex::new(Some(outcome_tx)),
                cancel: cancel.clone(),
            },
            ChannelSinkHandle {
                events: event_rx,
                outcome: outcome_rx,
                cancel,
            },
        )
    }

    fn send_outcome(&self, outcome: SinkOutcome) {
        if let Some(tx) = self.outcome.lock().expect("outcome lock poisoned").take() {
            let _ = tx.send(outcome);
        }
    }
}

impl EventSink for ChannelSink {
    fn push(&self, event: Event) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| BridgeError::SinkFailure("event receiver dropped".into()))
    }

    fn complete(&self) {
        self.send_outcome(SinkOutcome::Completed);
    }

    fn fail(&self, error: &BridgeError) {
        self.send_outcome(SinkOutcome::Failed(error.to_string()));
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Consumer side of a [`ChannelSink`].
pub struct ChannelSinkHandle {
    events: mpsc::UnboundedReceiver<Event>,
    outcome: oneshot::Receiver<SinkOutcome>,
    cancel: CancellationToken,
}

impl ChannelSinkHandle {
    /// Receive the next event, or `None` once the stream is closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Request cancellation. The in-flight run stops pulling fragments at
    /// the next boundary and still terminates through the event stream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Await the terminal signal. A producer that vanished without
    /// signalling counts as failed.
    pub async fn wait(self) -> SinkOutcome {
        self.outcome
            .await
            .unwrap_or_else(|_| SinkOutcome::Failed("producer dropped without signal".into()))
    }
}
