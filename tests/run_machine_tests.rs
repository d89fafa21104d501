//! Behavioural tests for the run state machine.

use agwire::backend::scripted::{fixtures, ScriptItem, ScriptedAdapter};
use agwire::prelude::*;
use pretty_assertions::assert_eq;

fn machine() -> RunStateMachine<CounterMessageIds> {
    RunStateMachine::with_ids(CounterMessageIds::new("msg"))
}

fn input() -> RunInput {
    RunInput::new("t1", "r1").with_message(Message::user("hi"))
}

async fn drive(adapter: &ScriptedAdapter) -> (Vec<Event>, Vec<SinkOutcome>, RunOutcome) {
    let sink = CollectingSink::new();
    let outcome = machine()
        .start(input(), adapter, &sink)
        .await
        .expect("run should start");
    (sink.events(), sink.terminals(), outcome)
}

/// Check the framing invariants over an emitted sequence.
///
/// `expect_clean` asserts every opened unit was closed (normal runs);
/// error runs are allowed to abandon open units.
fn assert_well_framed(events: &[Event], expect_clean: bool) {
    assert!(
        matches!(events.first(), Some(Event::RunStarted { .. })),
        "sequence must open with RUN_STARTED"
    );
    assert!(
        events.last().map(Event::is_terminal).unwrap_or(false),
        "sequence must close with a terminal event"
    );

    let mut open_message: Option<&str> = None;
    let mut open_tool_call: Option<&str> = None;
    let mut started = 0;
    let mut terminals = 0;

    for event in events {
        match event {
            Event::RunStarted { .. } => started += 1,
            Event::RunFinished { .. } | Event::RunError { .. } => terminals += 1,
            Event::TextMessageStart { message_id, .. } => {
                assert_eq!(open_message, None, "two messages open concurrently");
                open_message = Some(message_id);
            }
            Event::TextMessageContent { message_id, delta } => {
                assert_eq!(open_message, Some(message_id.as_str()), "orphan content");
                assert!(!delta.is_empty(), "empty content delta");
            }
            Event::TextMessageEnd { message_id } => {
                assert_eq!(open_message, Some(message_id.as_str()), "orphan end");
                open_message = None;
            }
            Event::ToolCallStart { tool_call_id, .. } => {
                assert_eq!(open_tool_call, None, "two tool calls open concurrently");
                open_tool_call = Some(tool_call_id);
            }
            Event::ToolCallArgs { tool_call_id, .. } => {
                assert_eq!(
                    open_tool_call,
                    Some(tool_call_id.as_str()),
                    "orphan tool args"
                );
            }
            Event::ToolCallEnd { tool_call_id } => {
                assert_eq!(
                    open_tool_call,
                    Some(tool_call_id.as_str()),
                    "orphan tool end"
                );
                open_tool_call = None;
            }
        }
    }

    assert_eq!(started, 1, "exactly one RUN_STARTED");
    assert_eq!(terminals, 1, "exactly one terminal event");
    if expect_clean {
        assert_eq!(open_message, None, "message left open");
        assert_eq!(open_tool_call, None, "tool call left open");
    }
}

#[tokio::test]
async fn text_run_emits_framed_message() {
    let adapter = fixtures::streaming_text(&["Hello ", "world!"]);
    let (events, terminals, outcome) = drive(&adapter).await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::text_message_start("msg_1"),
            Event::text_message_content("msg_1", "Hello "),
            Event::text_message_content("msg_1", "world!"),
            Event::text_message_end("msg_1"),
            Event::run_finished("t1", "r1"),
        ]
    );
    assert_eq!(terminals, vec![SinkOutcome::Completed]);
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_well_framed(&events, true);
}

#[tokio::test]
async fn tool_call_run_emits_framed_call() {
    let adapter = fixtures::tool_call("tc_1", "lookup", &["{\"q\":", "\"x\"}"]);
    let (events, terminals, outcome) = drive(&adapter).await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::tool_call_start("tc_1", "lookup", "msg_1"),
            Event::tool_call_args("tc_1", "{\"q\":"),
            Event::tool_call_args("tc_1", "\"x\"}"),
            Event::tool_call_end("tc_1"),
            Event::run_finished("t1", "r1"),
        ]
    );
    assert_eq!(terminals, vec![SinkOutcome::Completed]);
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_well_framed(&events, true);
}

#[tokio::test]
async fn tool_args_concatenate_to_full_json() {
    let adapter = fixtures::tool_call("tc_1", "lookup", &["{\"q\":", "\"x\"", "}"]);
    let (events, _, _) = drive(&adapter).await;

    let args: String = events
        .iter()
        .filter_map(|e| match e {
            Event::ToolCallArgs { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    let parsed: serde_json::Value = serde_json::from_str(&args).expect("args form valid JSON");
    assert_eq!(parsed, serde_json::json!({"q": "x"}));
}

#[tokio::test]
async fn fault_mid_stream_abandons_open_message() {
    let adapter = fixtures::fault_mid_stream("partial", "rate limited");
    let (events, terminals, outcome) = drive(&adapter).await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::text_message_start("msg_1"),
            Event::text_message_content("msg_1", "partial"),
            Event::run_error("backend fault: rate limited"),
        ]
    );
    // No TEXT_MESSAGE_END: the error event signals the truncation.
    assert_eq!(
        terminals,
        vec![SinkOutcome::Failed("backend fault: rate limited".into())]
    );
    assert!(outcome.is_errored());
    assert_well_framed(&events, false);
}

#[tokio::test]
async fn text_then_tool_call_closes_message_first() {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::Text("Looking that up.".into()),
        ScriptItem::ToolCall {
            id: "tc_1".into(),
            name: Some("lookup".into()),
            args_delta: Some("{}".into()),
        },
    ]);
    let (events, _, _) = drive(&adapter).await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::text_message_start("msg_1"),
            Event::text_message_content("msg_1", "Looking that up."),
            Event::text_message_end("msg_1"),
            Event::tool_call_start("tc_1", "lookup", "msg_1"),
            Event::tool_call_args("tc_1", "{}"),
            Event::tool_call_end("tc_1"),
            Event::run_finished("t1", "r1"),
        ]
    );
    assert_well_framed(&events, true);
}

#[tokio::test]
async fn tool_call_then_text_opens_fresh_message() {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::Text("Before.".into()),
        ScriptItem::ToolCall {
            id: "tc_1".into(),
            name: Some("lookup".into()),
            args_delta: None,
        },
        ScriptItem::Text("After.".into()),
    ]);
    let (events, _, _) = drive(&adapter).await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::text_message_start("msg_1"),
            Event::text_message_content("msg_1", "Before."),
            Event::text_message_end("msg_1"),
            Event::tool_call_start("tc_1", "lookup", "msg_1"),
            Event::tool_call_end("tc_1"),
            Event::text_message_start("msg_2"),
            Event::text_message_content("msg_2", "After."),
            Event::text_message_end("msg_2"),
            Event::run_finished("t1", "r1"),
        ]
    );
    assert_well_framed(&events, true);
}

#[tokio::test]
async fn sequential_tool_calls_close_implicitly() {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::ToolCall {
            id: "tc_1".into(),
            name: Some("first".into()),
            args_delta: Some("{}".into()),
        },
        ScriptItem::ToolCall {
            id: "tc_2".into(),
            name: Some("second".into()),
            args_delta: Some("{}".into()),
        },
    ]);
    let (events, _, outcome) = drive(&adapter).await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::tool_call_start("tc_1", "first", "msg_1"),
            Event::tool_call_args("tc_1", "{}"),
            Event::tool_call_end("tc_1"),
            Event::tool_call_start("tc_2", "second", "msg_1"),
            Event::tool_call_args("tc_2", "{}"),
            Event::tool_call_end("tc_2"),
            Event::run_finished("t1", "r1"),
        ]
    );
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_well_framed(&events, true);
}

#[tokio::test]
async fn interleaved_tool_calls_are_a_protocol_violation() {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::ToolCall {
            id: "tc_1".into(),
            name: Some("first".into()),
            args_delta: Some("{\"a\"".into()),
        },
        ScriptItem::ToolCall {
            id: "tc_2".into(),
            name: Some("second".into()),
            args_delta: Some("{}".into()),
        },
        // tc_1 again after it was implicitly closed
        ScriptItem::ToolCall {
            id: "tc_1".into(),
            name: None,
            args_delta: Some(":1}".into()),
        },
    ]);
    let (events, terminals, outcome) = drive(&adapter).await;

    assert!(outcome.is_errored());
    let last = events.last().unwrap();
    match last {
        Event::RunError { message } => {
            assert!(message.contains("protocol violation"), "got: {message}");
        }
        other => panic!("expected RUN_ERROR, got {other:?}"),
    }
    assert!(matches!(terminals.as_slice(), [SinkOutcome::Failed(_)]));
}

#[tokio::test]
async fn first_tool_delta_without_name_is_a_protocol_violation() {
    let adapter = ScriptedAdapter::new(vec![ScriptItem::ToolCall {
        id: "tc_1".into(),
        name: None,
        args_delta: Some("{}".into()),
    }]);
    let (events, _, outcome) = drive(&adapter).await;

    assert!(outcome.is_errored());
    assert_eq!(events.len(), 2); // RUN_STARTED, RUN_ERROR
    assert!(matches!(events.last(), Some(Event::RunError { .. })));
}

#[tokio::test]
async fn empty_text_deltas_are_dropped() {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::Text(String::new()),
        ScriptItem::Text("hi".into()),
        ScriptItem::Text(String::new()),
    ]);
    let (events, _, _) = drive(&adapter).await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::text_message_start("msg_1"),
            Event::text_message_content("msg_1", "hi"),
            Event::text_message_end("msg_1"),
            Event::run_finished("t1", "r1"),
        ]
    );
}

#[tokio::test]
async fn empty_fragment_stream_finishes_without_framing() {
    let adapter = ScriptedAdapter::new(vec![]);
    let (events, terminals, outcome) = drive(&adapter).await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::run_finished("t1", "r1"),
        ]
    );
    assert_eq!(terminals, vec![SinkOutcome::Completed]);
    assert_eq!(outcome.status, RunStatus::Finished);
}

#[tokio::test]
async fn replay_is_deterministic() {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::Text("a".into()),
        ScriptItem::ToolCall {
            id: "tc_1".into(),
            name: Some("lookup".into()),
            args_delta: Some("{}".into()),
        },
        ScriptItem::Text("b".into()),
    ]);

    let (first, _, _) = drive(&adapter).await;
    let (second, _, _) = drive(&adapter).await;

    let first_wire = serde_json::to_string(&first).unwrap();
    let second_wire = serde_json::to_string(&second).unwrap();
    assert_eq!(first_wire, second_wire);
}

#[tokio::test]
async fn cancellation_faults_within_one_fragment_boundary() {
    // RUN_STARTED + TEXT_MESSAGE_START + TEXT_MESSAGE_CONTENT, then the
    // cancellation is observed before the next pull.
    let sink = CollectingSink::cancel_after(3);
    let adapter = fixtures::streaming_text(&["one", "two", "three"]);
    let outcome = machine().start(input(), &adapter, &sink).await.unwrap();

    let events = sink.events();
    assert_eq!(
        events,
        vec![
            Event::run_started("t1", "r1"),
            Event::text_message_start("msg_1"),
            Event::text_message_content("msg_1", "one"),
            Event::run_error("run cancelled"),
        ]
    );
    assert_eq!(
        sink.terminals(),
        vec![SinkOutcome::Failed("run cancelled".into())]
    );
    assert!(outcome.is_errored());
}

#[tokio::test]
async fn consumer_side_cancel_terminates_channel_run() {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::Text("one".into()),
        ScriptItem::Delay { ms: 20 },
        ScriptItem::Text("two".into()),
        ScriptItem::Delay { ms: 20 },
        ScriptItem::Text("three".into()),
    ]);
    let (sink, mut handle) = ChannelSink::new();

    let run = tokio::spawn(async move {
        machine().start(input(), &adapter, &sink).await.unwrap()
    });

    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        if matches!(event, Event::TextMessageContent { .. }) {
            handle.cancel();
        }
        events.push(event);
    }

    let outcome = run.await.unwrap();
    assert!(outcome.is_errored());
    assert_eq!(
        events.last(),
        Some(&Event::run_error("run cancelled"))
    );
    assert_eq!(handle.wait().await, SinkOutcome::Failed("run cancelled".into()));
}

#[tokio::test]
async fn malformed_thread_rejected_before_any_event() {
    let sink = CollectingSink::new();
    let adapter = fixtures::streaming_text(&["never"]);

    let bad = RunInput::new("t1", "r1").with_message(Message {
        role: Role::Tool,
        content: Some("result".into()),
        tool_calls: None,
        tool_call_id: None,
    });

    let err = machine().start(bad, &adapter, &sink).await.unwrap_err();
    assert!(matches!(err, BridgeError::MalformedThread(_)));
    assert!(sink.events().is_empty());
    assert!(sink.terminals().is_empty());
}

#[tokio::test]
async fn tool_message_answering_unknown_call_is_malformed() {
    let sink = CollectingSink::new();
    let adapter = fixtures::streaming_text(&["never"]);

    let bad = RunInput::new("t1", "r1")
        .with_message(Message::user("do it"))
        .with_message(Message::tool("result", "tc_missing"));

    let err = machine().start(bad, &adapter, &sink).await.unwrap_err();
    assert!(matches!(err, BridgeError::MalformedThread(_)));
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn answered_tool_calls_validate() {
    let thread = vec![
        Message::user("look it up"),
        Message::assistant_with_tool_calls(
            None,
            vec![ToolCall::new("tc_1", "lookup", serde_json::json!({"q": "x"}))],
        ),
        Message::tool("{\"answer\":42}", "tc_1"),
    ];
    let adapter = fixtures::streaming_text(&["Found it."]);
    let sink = CollectingSink::new();
    let outcome = machine()
        .start(
            RunInput::new("t1", "r1").with_messages(thread),
            &adapter,
            &sink,
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Finished);
}

#[tokio::test]
async fn terminated_machine_rejects_reentry() {
    let adapter = fixtures::streaming_text(&["done"]);
    let sink = CollectingSink::new();
    let mut machine = machine();

    machine.start(input(), &adapter, &sink).await.unwrap();
    let err = machine.start(input(), &adapter, &sink).await.unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyTerminated));
}

#[tokio::test]
async fn in_flight_machine_rejects_reentry() {
    let adapter = ScriptedAdapter::new(vec![
        ScriptItem::Text("one".into()),
        ScriptItem::Delay { ms: 1000 },
        ScriptItem::Text("two".into()),
    ]);
    let sink = CollectingSink::new();
    let mut machine = machine();

    {
        let fut = machine.start(input(), &adapter, &sink);
        tokio::pin!(fut);
        // Poll until the machine parks on the scripted delay, then abandon
        // the run mid-flight.
        let poll = futures::poll!(fut.as_mut());
        assert!(poll.is_pending());
    }

    let err = machine.start(input(), &adapter, &sink).await.unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyStarted));
}

#[tokio::test]
async fn errored_run_reports_failure_through_outcome_and_sink() {
    struct FailingAdapter;

    #[async_trait::async_trait]
    impl BackendAdapter for FailingAdapter {
        fn backend_name(&self) -> &str {
            "failing"
        }

        async fn open(&self, _input: &RunInput) -> agwire::error::Result<FragmentStream> {
            Err(BridgeError::Authentication("bad key".into()))
        }
    }

    let sink = CollectingSink::new();
    let outcome = machine()
        .start(input(), &FailingAdapter, &sink)
        .await
        .unwrap();

    assert!(outcome.is_errored());
    assert_eq!(
        sink.events(),
        vec![
            Event::run_started("t1", "r1"),
            Event::run_error("authentication error: bad key"),
        ]
    );
    assert_eq!(
        sink.terminals(),
        vec![SinkOutcome::Failed("authentication error: bad key".into())]
    );
}

#[tokio::test]
async fn dropped_consumer_surfaces_as_sink_failure() {
    let adapter = fixtures::streaming_text(&["hello"]);
    let (sink, handle) = ChannelSink::new();
    drop(handle);

    let outcome = machine().start(input(), &adapter, &sink).await.unwrap();
    assert!(outcome.is_errored());
    assert!(outcome.error.unwrap().contains("sink failure"));
}
