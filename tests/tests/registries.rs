//! Registry behavior over live sessions: list-changed gating, resource
//! subscriptions, roots, the logging filter, prompts, sampling, and
//! completion.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;

use common::{client_config, connected_pair, sent_methods, server_config, setup_test_logging, wait_until};
use mcp_core::engine::{
    CompletionHandler, NotificationHandler, ProtocolEngine, RequestOptions, Role,
};
use mcp_core::error::{McpError, McpResult, ProtocolError, ValidationError};
use mcp_core::messages::{
    Capabilities, CompleteRequest, CompletionArgument, CompletionResult, CreateMessageRequest,
    LogLevel, LogMessageNotification, Prompt, PromptArgument, PromptContent, PromptMessage,
    Resource, ResourceUpdatedNotification, RootsChangedNotification, SamplingMessage, Tool,
};

/// Notification handler that records everything it sees.
#[derive(Default)]
struct RecordingHandler {
    tool_list_changes: AtomicUsize,
    resource_list_changes: AtomicUsize,
    resource_updates: Mutex<Vec<ResourceUpdatedNotification>>,
    roots_changes: Mutex<Vec<Vec<String>>>,
    log_messages: Mutex<Vec<LogMessageNotification>>,
    messages_created: AtomicUsize,
}

#[async_trait]
impl NotificationHandler for RecordingHandler {
    async fn on_tool_list_changed(&self) {
        self.tool_list_changes.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_resource_list_changed(&self) {
        self.resource_list_changes.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_resource_updated(&self, notification: ResourceUpdatedNotification) {
        self.resource_updates.lock().unwrap().push(notification);
    }

    async fn on_roots_changed(&self, notification: RootsChangedNotification) {
        self.roots_changes.lock().unwrap().push(notification.roots);
    }

    async fn on_log_message(&self, notification: LogMessageNotification) {
        self.log_messages.lock().unwrap().push(notification);
    }

    async fn on_message_created(&self, _notification: mcp_core::messages::MessageCreatedNotification) {
        self.messages_created.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn tool_list_changed_emitted_when_advertised_and_ready() {
    setup_test_logging();
    let (client, server, _ct, server_side) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_tools(true)),
    )
    .await;
    let handler = Arc::new(RecordingHandler::default());
    client.set_notification_handler(handler.clone());

    server
        .register_tool(
            Tool::new("echo", json!({"type": "object"})),
            Arc::new(|params| Box::pin(async move { Ok(params) })),
        )
        .unwrap();

    wait_until(|| {
        sent_methods(&server_side).contains(&"notifications/tools/list_changed".to_string())
    })
    .await;
    wait_until(|| handler.tool_list_changes.load(Ordering::SeqCst) == 1).await;

    server.unregister_tool("echo");
    wait_until(|| handler.tool_list_changes.load(Ordering::SeqCst) == 2).await;
}

#[tokio::test]
async fn tool_list_changed_suppressed_without_capability() {
    setup_test_logging();
    // Tools advertised, but without listChanged.
    let (_client, server, _ct, server_side) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_tools(false)),
    )
    .await;

    server
        .register_tool(
            Tool::new("quiet", json!({"type": "object"})),
            Arc::new(|params| Box::pin(async move { Ok(params) })),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!sent_methods(&server_side).contains(&"notifications/tools/list_changed".to_string()));
}

#[tokio::test]
async fn registration_before_ready_stays_silent() {
    setup_test_logging();
    let server = ProtocolEngine::server(server_config(Capabilities::new().with_tools(true)));
    // Mutation while Disconnected: the observer gate must hold it back.
    server
        .register_tool(
            Tool::new("early", json!({"type": "object"})),
            Arc::new(|params| Box::pin(async move { Ok(params) })),
        )
        .unwrap();

    let (client_side, server_side) = mcp_core::transport::InMemoryTransport::create_linked_pair();
    server.connect(server_side.clone()).await.unwrap();
    let client = ProtocolEngine::client(client_config(Capabilities::default()));
    client.connect(client_side).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!sent_methods(&server_side).contains(&"notifications/tools/list_changed".to_string()));

    // The tool is still there.
    assert_eq!(client.list_tools().await.unwrap(), vec!["early".to_string()]);
}

#[tokio::test]
async fn tool_invocation_validates_schema() {
    setup_test_logging();
    let (client, server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_tools(true)),
    )
    .await;

    server
        .register_tool(
            Tool::new(
                "add",
                json!({
                    "type": "object",
                    "properties": {"x": {"type": "number"}, "y": {"type": "number"}},
                    "required": ["x", "y"]
                }),
            ),
            Arc::new(|params| {
                Box::pin(async move {
                    let x = params["x"].as_f64().unwrap_or_default();
                    let y = params["y"].as_f64().unwrap_or_default();
                    Ok(json!(x + y))
                })
            }),
        )
        .unwrap();

    let result = client
        .call_tool("add", json!({"x": 2, "y": 3}), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(result, json!({"value": 5.0}));

    let err = client
        .call_tool("add", json!({"x": 2}), RequestOptions::new())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32602, ref message })
            if message.contains("Missing required property: y")
    );

    let err = client
        .call_tool("add", json!({"x": "two", "y": 3}), RequestOptions::new())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32602, .. })
    );
}

#[tokio::test]
async fn tool_handler_errors_become_internal_errors() {
    setup_test_logging();
    let (client, server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_tools(true)),
    )
    .await;

    server
        .register_tool(
            Tool::new("explode", json!({"type": "object"})),
            Arc::new(|_| {
                Box::pin(async move { Err(mcp_core::McpError::internal("handler blew up")) })
            }),
        )
        .unwrap();

    let err = client
        .call_tool("explode", json!({}), RequestOptions::new())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32603, ref message })
            if message.contains("handler blew up")
    );
}

#[tokio::test]
async fn resource_subscription_lifecycle() {
    setup_test_logging();
    let (client, server, _ct, server_side) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_resources(true, true)),
    )
    .await;
    let handler = Arc::new(RecordingHandler::default());
    client.set_notification_handler(handler.clone());

    // New URI after Ready: listing churn.
    server.register_resource(Resource::new("mem://a", "text/plain", "v1"));
    wait_until(|| handler.resource_list_changes.load(Ordering::SeqCst) == 1).await;

    let read = client.read_resource("mem://a").await.unwrap();
    assert_eq!(read.contents.len(), 1);
    assert_eq!(read.contents[0].uri, "mem://a");
    assert_eq!(read.contents[0].mime_type, "text/plain");
    assert_eq!(read.contents[0].text, "v1");

    client.subscribe_resource("mem://a").await.unwrap();

    // Re-register: content mutation, not churn.
    server.register_resource(Resource::new("mem://a", "text/plain", "v2"));
    wait_until(|| handler.resource_updates.lock().unwrap().len() == 1).await;
    {
        let updates = handler.resource_updates.lock().unwrap();
        assert_eq!(updates[0].uri, "mem://a");
        assert_eq!(updates[0].content, "v2");
    }
    assert_eq!(handler.resource_list_changes.load(Ordering::SeqCst), 1);

    // After unsubscribe, further mutations stay quiet.
    client.unsubscribe_resource("mem://a").await.unwrap();
    server.register_resource(Resource::new("mem://a", "text/plain", "v3"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.resource_updates.lock().unwrap().len(), 1);
    assert!(!sent_methods(&server_side).is_empty());
}

#[tokio::test]
async fn subscribe_unknown_resource_is_invalid_params() {
    setup_test_logging();
    let (client, _server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_resources(true, true)),
    )
    .await;

    let err = client.subscribe_resource("mem://missing").await.unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32602, ref message })
            if message.contains("Unknown resource")
    );
}

#[tokio::test]
async fn roots_flow_from_client_to_server() {
    setup_test_logging();
    let (client, server, _ct, _st) = connected_pair(
        client_config(Capabilities::new().with_roots(true)),
        server_config(Capabilities::default()),
    )
    .await;
    let handler = Arc::new(RecordingHandler::default());
    server.set_notification_handler(handler.clone());

    assert!(client.add_root("file:///workspace"));
    assert!(!client.add_root("file:///workspace"));

    wait_until(|| handler.roots_changes.lock().unwrap().len() == 1).await;
    assert_eq!(
        handler.roots_changes.lock().unwrap()[0],
        vec!["file:///workspace".to_string()]
    );

    let roots = server.list_roots().await.unwrap();
    assert_eq!(roots, vec!["file:///workspace".to_string()]);

    assert!(client.remove_root("file:///workspace"));
    wait_until(|| handler.roots_changes.lock().unwrap().len() == 2).await;
    assert!(handler.roots_changes.lock().unwrap()[1].is_empty());
}

#[tokio::test]
async fn logging_filter_respects_threshold_and_capability() {
    setup_test_logging();
    let (client, server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_logging()),
    )
    .await;
    let handler = Arc::new(RecordingHandler::default());
    client.set_notification_handler(handler.clone());

    // Before a threshold is set, nothing is emitted.
    assert!(!server
        .send_log_message(LogLevel::Emergency, json!("early"), None)
        .unwrap());

    client.set_logging_level(LogLevel::Warning).await.unwrap();
    assert_eq!(server.logging_level(), Some(LogLevel::Warning));

    assert!(!server
        .send_log_message(LogLevel::Info, json!("too quiet"), None)
        .unwrap());
    assert!(server
        .send_log_message(LogLevel::Error, json!("loud"), Some("core".to_string()))
        .unwrap());

    wait_until(|| handler.log_messages.lock().unwrap().len() == 1).await;
    let messages = handler.log_messages.lock().unwrap();
    assert_eq!(messages[0].level, LogLevel::Error);
    assert_eq!(messages[0].logger.as_deref(), Some("core"));
    assert_eq!(messages[0].data, json!("loud"));
}

#[tokio::test]
async fn set_level_rejects_unknown_levels() {
    setup_test_logging();
    let (client, _server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_logging()),
    )
    .await;

    let err = client
        .request(
            "logging/setLevel",
            Some(json!({"level": "verbose"})),
            RequestOptions::new(),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32602, .. })
    );
}

#[tokio::test]
async fn set_level_without_capability_is_specific_error() {
    setup_test_logging();
    let (client, _server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::default()),
    )
    .await;

    // The local gate trips first.
    let err = client.set_logging_level(LogLevel::Info).await.unwrap_err();
    assert_matches!(
        err,
        McpError::Validation(ValidationError::UnsupportedCapability { ref reason })
            if reason == "Server does not support logging"
    );

    // Forcing the frame through shows the server-side message.
    let err = client
        .request(
            "logging/setLevel",
            Some(json!({"level": "info"})),
            RequestOptions::new(),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32601, ref message })
            if message.contains("Logging not supported")
    );
}

#[tokio::test]
async fn prompt_get_and_execute() {
    setup_test_logging();
    let (client, server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_prompts(true)),
    )
    .await;

    server.register_prompt(
        Prompt::new("greet")
            .with_description("Greet someone")
            .with_argument(PromptArgument::required("name")),
        Some(Arc::new(|args: HashMap<String, serde_json::Value>| {
            Box::pin(async move {
                let name = args["name"].as_str().unwrap_or("stranger").to_string();
                Ok(vec![PromptMessage::assistant(format!("Hello, {name}!"))])
            })
        })),
    );

    // Missing required argument.
    let err = client.get_prompt("greet", HashMap::new()).await.unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32602, ref message })
            if message.contains("Missing required argument: name")
    );

    // Deterministic rendering through get.
    let mut args = HashMap::new();
    args.insert("name".to_string(), json!("alice"));
    let rendered = client.get_prompt("greet", args.clone()).await.unwrap();
    assert_eq!(rendered.description.as_deref(), Some("Greet someone"));
    let PromptContent::Text { text } = &rendered.messages[0].content;
    assert_eq!(text, "Greet someone\nname: alice");

    // Executor through execute.
    let executed = client.execute_prompt("greet", args).await.unwrap();
    let PromptContent::Text { text } = &executed.messages[0].content;
    assert_eq!(text, "Hello, alice!");

    let listing = client.list_prompts().await.unwrap();
    assert_eq!(listing.prompts.len(), 1);
    assert_eq!(listing.prompts[0].name, "greet");
}

#[tokio::test]
async fn sampling_round_trip_with_placeholder() {
    setup_test_logging();
    let (client, server, _ct, _st) = connected_pair(
        client_config(Capabilities::new().with_sampling()),
        server_config(Capabilities::default()),
    )
    .await;
    let handler = Arc::new(RecordingHandler::default());
    server.set_notification_handler(handler.clone());

    let response = server
        .create_message(CreateMessageRequest {
            messages: vec![SamplingMessage::user("hello?")],
            model_preferences: None,
            system_prompt: None,
            include_context: None,
            temperature: None,
            max_tokens: 32,
            stop_sequences: None,
            metadata: None,
        })
        .await
        .unwrap();

    let mcp_core::messages::SamplingContent::Text { text } = &response.message.content;
    assert!(text.contains("Placeholder response"));

    // The answering side also announced the created message.
    wait_until(|| handler.messages_created.load(Ordering::SeqCst) == 1).await;

    // Without the capability on the peer, the call fails locally.
    let err = client
        .create_message(CreateMessageRequest {
            messages: vec![SamplingMessage::user("hi")],
            model_preferences: None,
            system_prompt: None,
            include_context: None,
            temperature: None,
            max_tokens: 8,
            stop_sequences: None,
            metadata: None,
        })
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Validation(ValidationError::UnsupportedCapability { .. })
    );
}

struct BigCompletion;

#[async_trait]
impl CompletionHandler for BigCompletion {
    async fn complete(&self, _request: CompleteRequest) -> McpResult<CompletionResult> {
        Ok(CompletionResult {
            values: (0..150).map(|i| format!("value-{i}")).collect(),
            total: None,
            has_more: None,
        })
    }
}

#[tokio::test]
async fn completion_caps_values_at_one_hundred() {
    setup_test_logging();
    let (client_side, server_side) = mcp_core::transport::InMemoryTransport::create_linked_pair();

    let server = ProtocolEngine::builder(Role::Server)
        .config(server_config(Capabilities::default()))
        .completion_handler(Arc::new(BigCompletion))
        .build();
    server.connect(server_side).await.unwrap();

    let client = ProtocolEngine::client(client_config(Capabilities::default()));
    client.connect(client_side).await.unwrap();

    let response = client
        .complete(CompleteRequest {
            reference: json!({"type": "ref/prompt", "name": "greet"}),
            argument: CompletionArgument {
                name: "name".to_string(),
                value: "va".to_string(),
            },
        })
        .await
        .unwrap();

    assert_eq!(response.completion.values.len(), 100);
    assert_eq!(response.completion.total, Some(150));
    assert_eq!(response.completion.has_more, Some(true));
}
