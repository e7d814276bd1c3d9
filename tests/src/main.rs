//! Smoke-test runner: wires a client and a server engine over an in-memory
//! linked pair, runs the handshake, and exercises one operation per
//! capability area. Useful as a quick sanity check outside the test
//! harness: `cargo run -p mcp-runtime-tests --bin test-runner`.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use mcp_core::engine::{EngineConfig, ProtocolEngine};
use mcp_core::messages::{Capabilities, Implementation, Resource, Tool};
use mcp_core::transport::InMemoryTransport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (client_side, server_side) = InMemoryTransport::create_linked_pair();

    let server = ProtocolEngine::server(EngineConfig::new(
        Implementation::new("smoke-server", "0.1.0"),
        Capabilities::new()
            .with_tools(true)
            .with_resources(true, true)
            .with_logging(),
    ));
    server.register_tool(
        Tool::new("echo", json!({"type": "object"})).with_description("Echoes its params"),
        Arc::new(|params| Box::pin(async move { Ok(params) })),
    )?;
    server.register_resource(Resource::new("mem://motd", "text/plain", "hello"));
    server.connect(server_side).await?;

    let client = ProtocolEngine::client(EngineConfig::new(
        Implementation::new("smoke-client", "0.1.0"),
        Capabilities::new(),
    ));
    client.connect(client_side).await?;

    client.ping().await?;
    tracing::info!("ping ok");

    let tools = client.list_tools().await?;
    anyhow::ensure!(tools == vec!["echo".to_string()], "unexpected tools: {tools:?}");
    tracing::info!(?tools, "tools/list ok");

    let result = client
        .call_tool("echo", json!({"n": 1}), Default::default())
        .await?;
    anyhow::ensure!(result == json!({"value": {"n": 1}}), "unexpected echo: {result}");
    tracing::info!(%result, "tool invocation ok");

    let read = client.read_resource("mem://motd").await?;
    anyhow::ensure!(read.contents[0].text == "hello");
    tracing::info!("resources/read ok");

    client.disconnect().await?;
    server.disconnect().await?;

    println!("all smoke checks passed");
    Ok(())
}
