mod common;

use std::sync::Arc;

use common::{
    HeldGateway, harness, split_stream, turn_requesting_weather, turn_text,
};
use threadloom::approval::ApprovalDecision;
use threadloom::checkpoint::InMemoryCheckpointStore;
use threadloom::gateway::{GatewayError, ModelGateway};
use threadloom::graph::RunInput;
use threadloom::options::ExecutionOptions;
use threadloom::records::InMemoryConversationRecords;
use threadloom::service::{AgentService, ServiceError};
use threadloom::stream::{OutwardEvent, StreamEnd};
use threadloom::tools::StaticToolRegistry;

#[tokio::test]
async fn paris_scenario_with_approval_pause() {
    let fx = harness(vec![
        turn_requesting_weather("t1", "Paris"),
        turn_text("It's sunny in Paris."),
    ]);

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::UserText("What's the weather in Paris?".into()),
            ExecutionOptions::new(),
        )
        .await
        .unwrap();
    let (events, end) = split_stream(stream.collect().await);

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], OutwardEvent::Ai { tool_calls: Some(_), .. }));
    match end {
        StreamEnd::Suspended { pending } => assert_eq!(pending.request.name, "get_weather"),
        other => panic!("expected suspension, got {other:?}"),
    }
    assert!(fx.weather.invocations().is_empty());

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::Decision(ApprovalDecision::Continue),
            ExecutionOptions::new(),
        )
        .await
        .unwrap();
    let (events, end) = split_stream(stream.collect().await);

    assert_eq!(end, StreamEnd::Completed);
    assert!(matches!(events[0], OutwardEvent::Tool { ref content, .. } if content.contains("Paris")));
    assert!(matches!(events[1], OutwardEvent::Ai { .. }));
    assert_eq!(fx.weather.invocations().len(), 1);
}

#[tokio::test]
async fn paris_scenario_auto_approve_runs_in_one_stream() {
    let fx = harness(vec![
        turn_requesting_weather("t1", "Paris"),
        turn_text("It's sunny in Paris."),
    ]);

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::UserText("What's the weather in Paris?".into()),
            ExecutionOptions::new().with_auto_approve(true),
        )
        .await
        .unwrap();
    let (events, end) = split_stream(stream.collect().await);

    assert_eq!(end, StreamEnd::Completed);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], OutwardEvent::Ai { tool_calls: Some(_), .. }));
    assert!(matches!(events[1], OutwardEvent::Tool { .. }));
    assert!(matches!(events[2], OutwardEvent::Ai { tool_calls: None, .. }));
}

#[tokio::test]
async fn history_replays_in_order_and_is_idempotent() {
    let fx = harness(vec![
        turn_requesting_weather("t1", "Paris"),
        turn_text("It's sunny in Paris."),
    ]);

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::UserText("What's the weather in Paris?".into()),
            ExecutionOptions::new().with_auto_approve(true),
        )
        .await
        .unwrap();
    split_stream(stream.collect().await);

    let first = fx.service.history("c1").await.unwrap();
    let kinds: Vec<&str> = first
        .iter()
        .map(|e| match e {
            OutwardEvent::Human { .. } => "human",
            OutwardEvent::Ai { .. } => "ai",
            OutwardEvent::Tool { .. } => "tool",
            OutwardEvent::Error { .. } => "error",
        })
        .collect();
    assert_eq!(kinds, vec!["human", "ai", "tool", "ai"]);

    let second = fx.service.history("c1").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn history_filters_feedback_carriers() {
    let fx = harness(vec![
        turn_requesting_weather("t1", "Paris"),
        turn_text("Which day do you want?"),
    ]);

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::UserText("weather?".into()),
            ExecutionOptions::new(),
        )
        .await
        .unwrap();
    split_stream(stream.collect().await);

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::Decision(ApprovalDecision::Feedback {
                text: "ask for the forecast".into(),
            }),
            ExecutionOptions::new(),
        )
        .await
        .unwrap();
    split_stream(stream.collect().await);

    let history = fx.service.history("c1").await.unwrap();
    assert!(!history.iter().any(|e| matches!(e, OutwardEvent::Tool { .. })));
}

#[tokio::test]
async fn history_of_unknown_conversation_is_empty() {
    let fx = harness(vec![]);
    assert!(fx.service.history("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn decision_without_pending_rejected_before_spawning() {
    let fx = harness(vec![]);

    let err = fx
        .service
        .run(
            "c1",
            RunInput::Decision(ApprovalDecision::Continue),
            ExecutionOptions::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NoPendingApproval { .. }));
    assert_eq!(fx.gateway.call_count(), 0);
}

#[tokio::test]
async fn user_text_while_parked_rejected_before_spawning() {
    let fx = harness(vec![turn_requesting_weather("t1", "Paris")]);

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::UserText("weather?".into()),
            ExecutionOptions::new(),
        )
        .await
        .unwrap();
    split_stream(stream.collect().await);

    let err = fx
        .service
        .run(
            "c1",
            RunInput::UserText("never mind".into()),
            ExecutionOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ApprovalPending { .. }));
}

#[tokio::test]
async fn concurrent_run_on_same_conversation_is_rejected() {
    let gateway = Arc::new(HeldGateway::new());
    let entered = Arc::clone(&gateway.entered);
    let release = Arc::clone(&gateway.release);
    let service = AgentService::new(
        gateway as Arc<dyn ModelGateway>,
        Arc::new(StaticToolRegistry::new()),
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(InMemoryConversationRecords::new()),
    );

    let stream = service
        .run("c1", RunInput::UserText("hi".into()), ExecutionOptions::new())
        .await
        .unwrap();
    entered.notified().await;

    let err = service
        .run("c1", RunInput::UserText("again".into()), ExecutionOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ConversationBusy { .. }));

    // A different conversation is unaffected by the busy one.
    let other = service
        .run("c2", RunInput::UserText("hello".into()), ExecutionOptions::new())
        .await;
    assert!(other.is_ok());
    release.notify_one();
    release.notify_one();
    split_stream(stream.collect().await);

    // The slot frees once the first run's stream ends.
    let retry = service
        .run("c1", RunInput::UserText("again".into()), ExecutionOptions::new())
        .await;
    assert!(retry.is_ok());
    release.notify_one();
}

#[tokio::test]
async fn gateway_failure_surfaces_error_event_and_failed_end() {
    let fx = harness(vec![Err(GatewayError::Provider {
        message: "upstream timeout".into(),
    })]);

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::UserText("hello".into()),
            ExecutionOptions::new(),
        )
        .await
        .unwrap();
    let (events, end) = split_stream(stream.collect().await);

    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        OutwardEvent::Error { ref content, .. } if content.contains("upstream timeout")
    ));
    assert!(matches!(end, StreamEnd::Failed { ref error } if error.contains("upstream timeout")));
}

#[tokio::test]
async fn run_ensures_a_conversation_record() {
    let fx = harness(vec![turn_text("hello")]);

    let stream = fx
        .service
        .run(
            "c1",
            RunInput::UserText("What's the weather in Paris?".into()),
            ExecutionOptions::new(),
        )
        .await
        .unwrap();
    split_stream(stream.collect().await);

    assert_eq!(
        fx.records.title("c1").as_deref(),
        Some("What's the weather in Paris?")
    );
}

#[tokio::test]
async fn unknown_tool_in_allow_list_is_rejected() {
    let fx = harness(vec![]);

    let err = fx
        .service
        .run(
            "c1",
            RunInput::UserText("hi".into()),
            ExecutionOptions::new().with_tools(vec!["missing".into()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Registry(_)));
}
