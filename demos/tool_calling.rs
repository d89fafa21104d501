//! Stream a scripted tool-call run and print the AG-UI event sequence.
//!
//! ```sh
//! cargo run --example tool_calling
//! ```

use agwire::backend::scripted::{ScriptItem, ScriptedAdapter};
use agwire::prelude::*;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::Text("Let me look that up.".into()),
        ScriptItem::ToolCall {
            id: "call_1".into(),
            name: Some("search".into()),
            args_delta: Some("{\"query\":".into()),
        },
        ScriptItem::ToolCall {
            id: "call_1".into(),
            name: None,
            args_delta: Some("\"rust streams\"}".into()),
        },
    ]);

    let input = RunInput::new("thread_1", "run_1")
        .with_message(Message::user("Search for rust streams"))
        .with_tool(ToolDefinition::new(
            "search",
            "Search the web",
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        ));

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
