//! Agwire — AG-UI protocol bridge
//!
//! Adapts a streaming LLM backend (chat-completion API with token-level and
//! tool-call deltas) into the canonical, strictly-ordered AG-UI event
//! stream. Backends plug in behind [`backend::BackendAdapter`]; the
//! [`run::RunStateMachine`] turns their fragments into framed lifecycle
//! events delivered through an [`sink::EventSink`].
//!
//! # Quick Start
//!
//! ```no_run
//! use agwire::prelude::*;
//! use agwire::backend::openai::OpenAiCompatibleAdapter;
//!
//! # async fn example() -> agwire::error::Result<()> {
//! let adapter = OpenAiCompatibleAdapter::from_env("gpt-4o")?;
//! let input = RunInput::new("thread_1", "run_1").with_message(Message::user("Hello!"));
//!
//! let (sink, mut handle) = ChannelSink::new();
//! let mut machine = RunStateMachine::new();
//!
//! tokio::spawn(async move {
//!     let _ = machine.start(input, &adapter, &sink).await;
//! });
//!
//! while let Some(event) = handle.next_event().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod prelude;
pub mod run;
pub mod sink;
pub mod types;
