//! Shared test fixtures: a scripted gateway, recording tools, and service
//! wiring over in-memory stores.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use threadloom::checkpoint::InMemoryCheckpointStore;
use threadloom::gateway::{
    AssistantTurn, GatewayError, ModelGateway, ModelRequest, ToolSchema,
};
use threadloom::message::{Message, ToolRequest};
use threadloom::records::InMemoryConversationRecords;
use threadloom::service::AgentService;
use threadloom::stream::{OutwardEvent, StreamEnd, StreamItem};
use threadloom::tools::{StaticToolRegistry, Tool, ToolError};

/// Gateway that plays back a fixed script of assistant turns, recording the
/// history it was shown on each call.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<AssistantTurn, GatewayError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<AssistantTurn, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// History snapshot of the n-th call.
    pub fn call(&self, n: usize) -> Vec<Message> {
        self.calls.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<AssistantTurn, GatewayError> {
        self.calls.lock().unwrap().push(request.messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(AssistantTurn::text("script exhausted")))
    }
}

/// Gateway that parks inside `invoke` until released, for busy-conversation
/// tests.
pub struct HeldGateway {
    pub entered: Arc<tokio::sync::Notify>,
    pub release: Arc<tokio::sync::Notify>,
}

impl HeldGateway {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(tokio::sync::Notify::new()),
            release: Arc::new(tokio::sync::Notify::new()),
        }
    }
}

#[async_trait]
impl ModelGateway for HeldGateway {
    async fn invoke(&self, _request: ModelRequest<'_>) -> Result<AssistantTurn, GatewayError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(AssistantTurn::text("released"))
    }
}

/// Weather tool that records every invocation's args.
#[derive(Default)]
pub struct WeatherTool {
    invocations: Mutex<Vec<FxHashMap<String, Value>>>,
}

impl WeatherTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> Vec<FxHashMap<String, Value>> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_weather".to_string(),
            description: "Current weather for a city".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }),
        }
    }

    async fn invoke(&self, args: &FxHashMap<String, Value>) -> Result<String, ToolError> {
        self.invocations.lock().unwrap().push(args.clone());
        let city = args
            .get("city")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                reason: "missing 'city'".to_string(),
            })?;
        Ok(format!("It's sunny in {city}."))
    }
}

pub fn weather_request(id: &str, city: &str) -> ToolRequest {
    let mut args = FxHashMap::default();
    args.insert("city".to_string(), json!(city));
    ToolRequest::new(id, "get_weather", args)
}

pub fn turn_requesting_weather(id: &str, city: &str) -> Result<AssistantTurn, GatewayError> {
    Ok(AssistantTurn::with_requests(
        "",
        vec![weather_request(id, city)],
    ))
}

pub fn turn_text(content: &str) -> Result<AssistantTurn, GatewayError> {
    Ok(AssistantTurn::text(content))
}

pub struct TestHarness {
    pub service: AgentService,
    pub gateway: Arc<ScriptedGateway>,
    pub weather: Arc<WeatherTool>,
    pub store: Arc<InMemoryCheckpointStore>,
    pub records: Arc<InMemoryConversationRecords>,
}

/// Service wired over in-memory everything, with the scripted gateway and a
/// recording weather tool.
pub fn harness(script: Vec<Result<AssistantTurn, GatewayError>>) -> TestHarness {
    let gateway = Arc::new(ScriptedGateway::new(script));
    let weather = Arc::new(WeatherTool::new());
    let store = Arc::new(InMemoryCheckpointStore::new());
    let records = Arc::new(InMemoryConversationRecords::new());
    let registry = Arc::new(
        StaticToolRegistry::new().with_tool(Arc::clone(&weather) as Arc<dyn Tool>),
    );
    let service = AgentService::new(
        Arc::clone(&gateway) as Arc<dyn ModelGateway>,
        registry,
        Arc::clone(&store) as Arc<dyn threadloom::checkpoint::CheckpointStore>,
        Arc::clone(&records) as Arc<dyn threadloom::records::ConversationRecords>,
    );
    TestHarness {
        service,
        gateway,
        weather,
        store,
        records,
    }
}

/// Splits a drained stream into its data events and the end marker,
/// asserting the marker is present and last.
pub fn split_stream(items: Vec<StreamItem>) -> (Vec<OutwardEvent>, StreamEnd) {
    let mut items = items;
    let end = match items.pop() {
        Some(StreamItem::End(end)) => end,
        other => panic!("stream must end with a marker, got {other:?}"),
    };
    let events = items
        .into_iter()
        .map(|item| match item {
            StreamItem::Event(event) => event,
            StreamItem::End(end) => panic!("end marker mid-stream: {end:?}"),
        })
        .collect();
    (events, end)
}
