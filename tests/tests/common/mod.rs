//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use mcp_core::engine::{EngineConfig, ProtocolEngine};
use mcp_core::messages::{
    Capabilities, Implementation, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
};
use mcp_core::transport::{InMemoryTransport, Subscription, Transport};

/// Install a test subscriber once; later calls are no-ops.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Client config named "c"/"1" to match the handshake transcripts.
pub fn client_config(capabilities: Capabilities) -> EngineConfig {
    EngineConfig::new(Implementation::new("c", "1"), capabilities)
}

/// Server config named "s"/"1" to match the handshake transcripts.
pub fn server_config(capabilities: Capabilities) -> EngineConfig {
    EngineConfig::new(Implementation::new("s", "1"), capabilities)
}

/// Two engines over a linked in-memory pair, handshake complete.
///
/// Returns (client engine, server engine, client-side transport,
/// server-side transport).
pub async fn connected_pair(
    client_cfg: EngineConfig,
    server_cfg: EngineConfig,
) -> (
    Arc<ProtocolEngine>,
    Arc<ProtocolEngine>,
    Arc<InMemoryTransport>,
    Arc<InMemoryTransport>,
) {
    let (client_side, server_side) = InMemoryTransport::create_linked_pair();

    let server = ProtocolEngine::server(server_cfg);
    server
        .connect(server_side.clone())
        .await
        .expect("server connect");

    let client = ProtocolEngine::client(client_cfg);
    client
        .connect(client_side.clone())
        .await
        .expect("client connect");

    (client, server, client_side, server_side)
}

/// Attach a scripted responder to the server side of a raw linked pair.
///
/// The closure sees every inbound request and the transport to reply on.
/// Keep the returned subscription alive for the duration of the test.
pub fn on_request<F, Fut>(transport: &Arc<InMemoryTransport>, respond: F) -> Subscription
where
    F: Fn(JsonRpcRequest, Arc<InMemoryTransport>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let respond = Arc::new(respond);
    let reply_side = transport.clone();
    transport.on_message(Arc::new(move |message| {
        let respond = respond.clone();
        let reply_side = reply_side.clone();
        Box::pin(async move {
            if let JsonRpcMessage::Request(request) = message {
                respond(request, reply_side).await;
            }
            Ok(())
        })
    }))
}

/// A well-formed initialize result advertising the given capabilities.
pub fn initialize_result(capabilities: Value) -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": {"name": "s", "version": "1"},
        "capabilities": capabilities
    })
}

/// Answer an initialize request in a scripted responder.
pub async fn answer_initialize(
    request: &JsonRpcRequest,
    transport: &Arc<InMemoryTransport>,
    capabilities: Value,
) -> bool {
    if request.method != "initialize" {
        return false;
    }
    let reply = JsonRpcResponse::success(request.id.clone(), initialize_result(capabilities));
    transport
        .send(JsonRpcMessage::Response(reply))
        .await
        .expect("initialize reply");
    true
}

/// Poll `check` until it holds or a second has passed.
pub async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}

/// Methods of every frame a transport has sent, in order.
pub fn sent_methods(transport: &Arc<InMemoryTransport>) -> Vec<String> {
    transport
        .sent_messages()
        .iter()
        .filter_map(|m| m.method().map(str::to_string))
        .collect()
}
