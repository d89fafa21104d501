//! In-memory sink that records everything it is handed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{BridgeError, Result};
use crate::types::Event;

use super::{EventSink, SinkOutcome};

/// Recording sink for tests and synchronous harnesses.
///
/// Terminal signals are recorded rather than enforced, so tests can assert
/// the exactly-once contract instead of assuming it.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
    terminals: Mutex<Vec<SinkOutcome>>,
    cancelled: AtomicBool,
    cancel_after: Option<usize>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report cancellation once `n` events have been pushed.
    pub fn cancel_after(n: usize) -> Self {
        Self {
            cancel_after: Some(n),
            ..Self::default()
        }
    }

    /// Request cancellation directly.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events lock poisoned").clone()
    }

    /// All terminal signals received (a conforming producer sends one).
    pub fn terminals(&self) -> Vec<SinkOutcome> {
        self.terminals
            .lock()
            .expect("terminals lock poisoned")
            .clone()
    }

    /// The single terminal signal, if exactly one was received.
    pub fn outcome(&self) -> Option<SinkOutcome> {
        let terminals = self.terminals();
        match terminals.as_slice() {
            [one] => Some(one.clone()),
            _ => None,
        }
    }
}

impl EventSink for CollectingSink {
    fn push(&self, event: Event) -> Result<()> {
        let mut events = self.events.lock().expect("events lock poisoned");
        events.push(event);
        if let Some(n) = self.cancel_after {
            if events.len() >= n {
                self.cancelled.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn complete(&self) {
        self.terminals
            .lock()
            .expect("terminals lock poisoned")
            .push(SinkOutcome::Completed);
    }

    fn fail(&self, error: &BridgeError) {
        self.terminals
            .lock()
            .expect("terminals lock poisoned")
            .push(SinkOutcome::Failed(error.to_string()));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
