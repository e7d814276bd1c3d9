//! End-to-end engine scenarios over a linked in-memory pair.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;

use common::{
    answer_initialize, client_config, connected_pair, on_request, sent_methods, server_config,
    setup_test_logging, wait_until,
};
use mcp_core::engine::{ProtocolEngine, RequestOptions, SessionState};
use mcp_core::error::{McpError, ProtocolError, ValidationError};
use mcp_core::messages::{
    Capabilities, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use mcp_core::transport::{InMemoryTransport, Transport};

#[tokio::test]
async fn handshake_success_transcript() {
    setup_test_logging();
    let (client, server, client_side, server_side) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::default()),
    )
    .await;

    assert_eq!(client.state(), SessionState::Ready);
    assert_eq!(server.state(), SessionState::Ready);

    // Frame #0 out of the client is the exact initialize request.
    let frame = serde_json::to_value(&client_side.sent_messages()[0]).unwrap();
    assert_eq!(
        frame,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "c", "version": "1"},
                "capabilities": {}
            }
        })
    );

    // Frame #0 out of the server is the matching response.
    let reply = serde_json::to_value(&server_side.sent_messages()[0]).unwrap();
    assert_eq!(
        reply,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "protocolVersion": "2024-11-05",
                "serverInfo": {"name": "s", "version": "1"},
                "capabilities": {}
            }
        })
    );

    let peer = client.peer_info().unwrap();
    assert_eq!(peer.info.name, "s");
}

#[tokio::test]
async fn handshake_version_mismatch_rejects() {
    setup_test_logging();
    let (client_side, server_side) = InMemoryTransport::create_linked_pair();
    server_side.connect().await.unwrap();

    let _responder = on_request(&server_side, |request, transport| async move {
        let reply = JsonRpcResponse::success(
            request.id,
            json!({
                "protocolVersion": "0.1.0",
                "serverInfo": {"name": "s", "version": "1"},
                "capabilities": {}
            }),
        );
        transport
            .send(JsonRpcMessage::Response(reply))
            .await
            .unwrap();
    });

    let client = ProtocolEngine::client(client_config(Capabilities::default()));
    let err = client.connect(client_side).await.unwrap_err();

    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::VersionMismatch { ref actual, .. }) if actual == "0.1.0"
    );
    assert!(err
        .to_string()
        .contains("Protocol version mismatch: expected 2024-11-05, got 0.1.0"));
    assert_eq!(client.state(), SessionState::Closed);
}

#[tokio::test]
async fn out_of_order_completion_resolves_both() {
    setup_test_logging();
    let (client_side, server_side) = InMemoryTransport::create_linked_pair();
    server_side.connect().await.unwrap();

    let held: Arc<Mutex<Vec<JsonRpcRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let held_in_responder = held.clone();
    let _responder = on_request(&server_side, move |request, transport| {
        let held = held_in_responder.clone();
        async move {
            if answer_initialize(&request, &transport, json!({"tools": {}})).await {
                return;
            }
            let ready = {
                let mut held = held.lock().unwrap();
                held.push(request);
                held.len() == 2
            };
            if ready {
                // Answer the second request first, then the first.
                let held = held.lock().unwrap().clone();
                for request in held.iter().rev() {
                    let reply = JsonRpcResponse::success(
                        request.id.clone(),
                        json!({"tool": request.method}),
                    );
                    transport
                        .send(JsonRpcMessage::Response(reply))
                        .await
                        .unwrap();
                }
            }
        }
    });

    let client = ProtocolEngine::client(client_config(Capabilities::default()));
    client.connect(client_side).await.unwrap();

    let (a, b) = tokio::join!(
        client.call_tool("a", json!({}), RequestOptions::new()),
        client.call_tool("b", json!({}), RequestOptions::new()),
    );
    assert_eq!(a.unwrap(), json!({"tool": "a"}));
    assert_eq!(b.unwrap(), json!({"tool": "b"}));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn request_timeout_removes_pending() {
    setup_test_logging();
    let (client_side, server_side) = InMemoryTransport::create_linked_pair();
    server_side.connect().await.unwrap();

    // Answers the handshake, then goes silent.
    let _responder = on_request(&server_side, |request, transport| async move {
        answer_initialize(&request, &transport, json!({"tools": {}})).await;
    });

    let client = ProtocolEngine::client(
        client_config(Capabilities::default()).with_request_timeout(Duration::from_millis(100)),
    );
    client.connect(client_side.clone()).await.unwrap();

    let started = std::time::Instant::now();
    let err = client
        .call_tool("x", json!({}), RequestOptions::new())
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::RequestTimeout { millis: 100 })
    );
    assert!(err.to_string().contains("Request timed out after 100ms"));
    assert!(elapsed >= Duration::from_millis(90), "fired too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "fired too late: {elapsed:?}");
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn peer_cancellation_rejects_awaiter() {
    setup_test_logging();
    let (client_side, server_side) = InMemoryTransport::create_linked_pair();
    server_side.connect().await.unwrap();

    let _responder = on_request(&server_side, |request, transport| async move {
        if answer_initialize(&request, &transport, json!({"tools": {}})).await {
            return;
        }
        let id = request.id.as_number().unwrap();
        transport
            .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/cancelled",
                json!({"requestId": id, "reason": "because"}),
            )))
            .await
            .unwrap();
    });

    let client = ProtocolEngine::client(client_config(Capabilities::default()));
    client.connect(client_side).await.unwrap();

    let err = client
        .call_tool("x", json!({}), RequestOptions::new())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::RequestCancelled { ref reason }) if reason == "because"
    );
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn local_cancellation_rejects_awaiter_and_notifies() {
    setup_test_logging();
    let (client_side, server_side) = InMemoryTransport::create_linked_pair();
    server_side.connect().await.unwrap();

    let _responder = on_request(&server_side, |request, transport| async move {
        answer_initialize(&request, &transport, json!({"tools": {}})).await;
    });

    let client = ProtocolEngine::client(client_config(Capabilities::default()));
    client.connect(client_side.clone()).await.unwrap();

    let awaiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .call_tool("slow", json!({}), RequestOptions::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Handshake took id 1, so the tool call is id 2.
    assert!(client.cancel_request(2, "user cancelled"));

    let err = awaiter.await.unwrap().unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::RequestCancelled { ref reason })
            if reason == "user cancelled"
    );

    wait_until(|| sent_methods(&client_side).contains(&"notifications/cancelled".to_string()))
        .await;
}

#[tokio::test]
async fn progress_routed_then_ignored_after_completion() {
    setup_test_logging();
    let (client_side, server_side) = InMemoryTransport::create_linked_pair();
    server_side.connect().await.unwrap();

    let _responder = on_request(&server_side, |request, transport| async move {
        if answer_initialize(&request, &transport, json!({"tools": {}})).await {
            return;
        }
        let token = request.params.as_ref().unwrap()["_meta"]["progressToken"].clone();
        transport
            .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/progress",
                json!({"progressToken": token, "progress": 50, "total": 100}),
            )))
            .await
            .unwrap();
        transport
            .send(JsonRpcMessage::Response(JsonRpcResponse::success(
                request.id,
                json!({"ok": true}),
            )))
            .await
            .unwrap();
        // Late progress for the same token must be ignored.
        transport
            .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/progress",
                json!({"progressToken": token, "progress": 99, "total": 100}),
            )))
            .await
            .unwrap();
    });

    let client = ProtocolEngine::client(client_config(Capabilities::default()));
    client.connect(client_side).await.unwrap();

    let updates: Arc<Mutex<Vec<(f64, Option<f64>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let updates = updates.clone();
        Arc::new(move |progress: f64, total: Option<f64>| {
            updates.lock().unwrap().push((progress, total));
        })
    };

    let result = client
        .call_tool("x", json!({}), RequestOptions::new().with_progress(sink))
        .await
        .unwrap();
    assert_eq!(result, json!({"ok": true}));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*updates.lock().unwrap(), vec![(50.0, Some(100.0))]);
}

#[tokio::test]
async fn unsupported_capability_fails_locally() {
    setup_test_logging();
    let (client, _server, client_side, _server_side) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::default()),
    )
    .await;

    let err = client.list_tools().await.unwrap_err();
    assert_matches!(
        err,
        McpError::Validation(ValidationError::UnsupportedCapability { ref reason })
            if reason == "Server does not support tool listing"
    );

    // No frame beyond the handshake went out.
    assert_eq!(client_side.sent_messages().len(), 1);
}

#[tokio::test]
async fn requests_before_ready_get_not_initialized() {
    setup_test_logging();
    let (client_side, server_side) = InMemoryTransport::create_linked_pair();

    let server = ProtocolEngine::server(server_config(Capabilities::new().with_tools(true)));
    server.connect(server_side).await.unwrap();

    client_side.connect().await.unwrap();
    let replies: Arc<Mutex<Vec<JsonRpcMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let replies = replies.clone();
        client_side.on_message(Arc::new(move |message| {
            let replies = replies.clone();
            Box::pin(async move {
                replies.lock().unwrap().push(message);
                Ok(())
            })
        }))
    };

    // A request before initialize: Server not initialized (-32002).
    client_side
        .send(JsonRpcMessage::Request(JsonRpcRequest::new(
            42,
            "tools/list",
            json!({}),
        )))
        .await
        .unwrap();
    {
        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        let JsonRpcMessage::Response(response) = &replies[0] else {
            panic!("expected response");
        };
        assert_eq!(response.error.as_ref().unwrap().code, -32002);
    }

    // A notification before initialize is dropped silently.
    client_side
        .send(JsonRpcMessage::Notification(
            JsonRpcNotification::without_params("notifications/tools/list_changed"),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(replies.lock().unwrap().len(), 1);

    // Initialize still works afterwards.
    client_side
        .send(JsonRpcMessage::Request(JsonRpcRequest::new(
            43,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "c", "version": "1"},
                "capabilities": {}
            }),
        )))
        .await
        .unwrap();
    {
        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 2);
        let JsonRpcMessage::Response(response) = &replies[1] else {
            panic!("expected response");
        };
        assert!(response.is_success());
        assert_eq!(
            response.result.as_ref().unwrap()["protocolVersion"],
            "2024-11-05"
        );
    }
    assert_eq!(server.state(), SessionState::Ready);
}

#[tokio::test]
async fn double_initialize_rejected() {
    setup_test_logging();
    let (client, _server, client_side, server_side) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::default()),
    )
    .await;
    assert_eq!(client.state(), SessionState::Ready);

    // A second initialize request from the raw client side.
    client_side
        .send(JsonRpcMessage::Request(JsonRpcRequest::new(
            99,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "c", "version": "1"},
                "capabilities": {}
            }),
        )))
        .await
        .unwrap();

    wait_until(|| server_side.sent_messages().len() >= 2).await;
    let JsonRpcMessage::Response(response) = &server_side.sent_messages()[1] else {
        panic!("expected response");
    };
    let error = response.error.as_ref().unwrap();
    assert_eq!(error.code, -32600);
    assert_eq!(error.data.as_ref().unwrap(), "Server already initialized");
}

#[tokio::test]
async fn double_connect_fails_with_already_initialized() {
    setup_test_logging();
    let (client, _server, _client_side, _server_side) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::default()),
    )
    .await;

    let (extra, _peer) = InMemoryTransport::create_linked_pair();
    let err = client.connect(extra).await.unwrap_err();
    assert_matches!(err, McpError::Protocol(ProtocolError::AlreadyInitialized));
}

#[tokio::test]
async fn unknown_method_without_tool_is_method_not_found() {
    setup_test_logging();
    let (client, _server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_tools(true)),
    )
    .await;

    let err = client
        .request("no/such/method", Some(json!({})), RequestOptions::new())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32601, .. })
    );
}
