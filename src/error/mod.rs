//! Error types for agwire.

use thiserror::Error;

/// Primary error type for all bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The input thread failed validation. Rejected before `RUN_STARTED`;
    /// the run never starts.
    #[error("malformed thread: {0}")]
    MalformedThread(String),

    /// `start` was called on a state machine that is already driving a run.
    #[error("run already started")]
    AlreadyStarted,

    /// `start` was called on a state machine whose run already reached a
    /// terminal phase.
    #[error("run already terminated")]
    AlreadyTerminated,

    /// The backend produced fragments inconsistent with the framing rules
    /// (e.g. a tool-call delta with no name on first occurrence).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The backend's fragment sequence terminated with a fault that has no
    /// more specific variant.
    #[error("backend fault: {0}")]
    Backend(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// The consumer-side sink rejected delivery (e.g. receiver dropped).
    #[error("sink failure: {0}")]
    SinkFailure(String),

    /// The consumer requested cancellation mid-run.
    #[error("run cancelled")]
    Cancelled,
}

impl BridgeError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether this error originated on the backend side of the bridge.
    pub fn is_backend_fault(&self) -> bool {
        matches!(
            self,
            Self::Backend(_)
                | Self::Network(_)
                | Self::Api { .. }
                | Self::RateLimited { .. }
                | Self::Authentication(_)
                | Self::Serialization(_)
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
