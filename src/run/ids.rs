//! Message identifier sources.
//!
//! Identifier generation is injectable so tests can replay a fragment
//! sequence and get a byte-identical event sequence.

use uuid::Uuid;

/// Source of fresh message identifiers, scoped to one run.
pub trait MessageIdSource: Send {
    fn next_message_id(&mut self) -> String;
}

/// Default source: random `msg_<uuid>` identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidMessageIds;

impl MessageIdSource for UuidMessageIds {
    fn next_message_id(&mut self) -> String {
        format!("msg_{}", Uuid::new_v4().simple())
    }
}

/// Deterministic source: `<prefix>_1`, `<prefix>_2`, …
#[derive(Debug, Clone)]
pub struct CounterMessageIds {
    prefix: String,
    next: u64,
}

impl CounterMessageIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl Default for CounterMessageIds {
    fn default() -> Self {
        Self::new("msg")
    }
}

impl MessageIdSource for CounterMessageIds {
    fn next_message_id(&mut self) -> String {
        let id = format!("{}_{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
