//! Stream a scripted run and print the AG-UI event sequence.
//!
//! ```sh
//! cargo run --example streaming
//! ```

use agwire::backend::scripted::fixtures;
use agwire::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let adapter = fixtures::streaming_text(&["Hello ", "from ", "the ", "bridge!"]);
    let input = RunInput::new("thread_1", "run_1").with_message(Message::user("Say hello"));

    let (sink, mut handle) = ChannelSink::new();
    let mut machine = RunStateMachine::new();

    let run = tokio::spawn(async move { machine.start(input, &adapter, &sink).await });

    while let Some(event) = handle.next_event().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    let outcome = run.await.expect("run task panicked")?;
    println!("# outcome: {:?}", outcome.status);
    Ok(())
}
