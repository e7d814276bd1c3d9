//! The auth gate composed over a tool handler, exercised across the wire.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;

use common::{client_config, connected_pair, server_config, setup_test_logging};
use mcp_core::auth::{gate, AuthProvider, InMemoryAuthProvider, ManualClock, MethodHandler};
use mcp_core::engine::RequestOptions;
use mcp_core::error::{McpError, ProtocolError};
use mcp_core::messages::{Capabilities, Tool};

/// A tool whose handler is wrapped with `gate(["admin"], ...)`.
///
/// The server engine is returned so callers keep it alive.
async fn gated_setup() -> (
    Arc<mcp_core::ProtocolEngine>,
    Arc<mcp_core::ProtocolEngine>,
    Arc<InMemoryAuthProvider>,
    Arc<ManualClock>,
) {
    let (client, server, _ct, _st) = connected_pair(
        client_config(Capabilities::default()),
        server_config(Capabilities::new().with_tools(true)),
    )
    .await;

    let clock = Arc::new(ManualClock::starting_at(1_000_000));
    let provider = Arc::new(InMemoryAuthProvider::new(clock.clone()));

    let inner: MethodHandler = Arc::new(|params| {
        Box::pin(async move { Ok(json!({"echo": params.unwrap_or(serde_json::Value::Null)})) })
    });
    let gated = gate(provider.clone(), vec!["admin".to_string()], inner);

    server
        .register_tool(
            Tool::new("secure-echo", json!({"type": "object"})),
            Arc::new(move |params| {
                let gated = gated.clone();
                Box::pin(async move { gated(Some(params)).await })
            }),
        )
        .unwrap();

    (client, server, provider, clock)
}

#[tokio::test]
async fn missing_token_is_authorization_error() {
    setup_test_logging();
    let (client, _server, _provider, _clock) = gated_setup().await;

    let err = client
        .call_tool("secure-echo", json!({}), RequestOptions::new())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32401, ref message })
            if message == "No authorization token provided"
    );
}

#[tokio::test]
async fn invalid_token_is_authorization_error() {
    setup_test_logging();
    let (client, _server, _provider, _clock) = gated_setup().await;

    let err = client
        .call_tool(
            "secure-echo",
            json!({"token": "forged"}),
            RequestOptions::new(),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32401, ref message })
            if message.contains("Invalid token")
    );
}

#[tokio::test]
async fn expired_token_is_authorization_error() {
    setup_test_logging();
    let (client, _server, provider, clock) = gated_setup().await;

    let token = provider
        .generate_token("alice", &["admin".to_string()], 60)
        .await
        .unwrap();
    clock.advance(120);

    let err = client
        .call_tool(
            "secure-echo",
            json!({"token": token}),
            RequestOptions::new(),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32401, ref message })
            if message == "Token expired"
    );
}

#[tokio::test]
async fn wrong_role_is_insufficient_permissions() {
    setup_test_logging();
    let (client, _server, provider, _clock) = gated_setup().await;

    let token = provider
        .generate_token("bob", &["viewer".to_string()], 600)
        .await
        .unwrap();

    let err = client
        .call_tool(
            "secure-echo",
            json!({"token": token}),
            RequestOptions::new(),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        McpError::Protocol(ProtocolError::ServerError { code: -32401, ref message })
            if message == "Insufficient permissions"
    );
}

#[tokio::test]
async fn valid_token_runs_handler_with_token_stripped() {
    setup_test_logging();
    let (client, _server, provider, _clock) = gated_setup().await;

    let token = provider
        .generate_token("carol", &["admin".to_string()], 600)
        .await
        .unwrap();

    let result = client
        .call_tool(
            "secure-echo",
            json!({"token": token, "payload": 7}),
            RequestOptions::new(),
        )
        .await
        .unwrap();

    // The gate stripped the token before the inner handler ran.
    assert_eq!(result, json!({"value": {"echo": {"payload": 7}}}));
}
