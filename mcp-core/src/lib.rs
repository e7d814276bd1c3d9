//! # MCP Core Library
//!
//! `mcp-core` is a symmetric runtime for the Model Context Protocol (MCP):
//! a bidirectional JSON-RPC 2.0 framework connecting a client (typically a
//! language-model host) to a server (typically a capability provider). Both
//! peers embed the same [`engine::ProtocolEngine`], differing only in role.
//!
//! ## Features
//!
//! - **Complete MCP message types**: every JSON-RPC frame and method
//!   payload of the protocol, as plain serde structs
//! - **Pluggable transports**: in-memory linked pair, line-delimited byte
//!   stream (including spawned child processes), and SSE + HTTP POST
//! - **Request correlation**: timeouts, cooperative cancellation, and
//!   token-routed progress for every outstanding request
//! - **Capability routing**: inbound dispatch gated on locally advertised
//!   capabilities, outbound calls gated on the peer's
//! - **Registries**: tools, prompts, resources (+ templates), and roots,
//!   with change notifications and per-URI content subscriptions
//! - **Auth gate**: bearer-token middleware over an opaque provider contract
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcp_core::engine::{EngineConfig, ProtocolEngine};
//! use mcp_core::messages::{Capabilities, Implementation, Tool};
//! use mcp_core::transport::InMemoryTransport;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> mcp_core::McpResult<()> {
//!     let (client_side, server_side) = InMemoryTransport::create_linked_pair();
//!
//!     let server = ProtocolEngine::server(EngineConfig::new(
//!         Implementation::new("demo-server", "0.1.0"),
//!         Capabilities::new().with_tools(true),
//!     ));
//!     server.register_tool(
//!         Tool::new("echo", json!({"type": "object"})),
//!         Arc::new(|params| Box::pin(async move { Ok(params) })),
//!     )?;
//!     server.connect(server_side).await?;
//!
//!     let client = ProtocolEngine::client(EngineConfig::new(
//!         Implementation::new("demo-client", "0.1.0"),
//!         Capabilities::new(),
//!     ));
//!     client.connect(client_side).await?;
//!
//!     let result = client
//!         .call_tool("echo", json!({"hello": "world"}), Default::default())
//!         .await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`error`]: structured error types for every failure mode
//! - [`messages`]: MCP message type definitions
//! - [`validation`]: wire-shape checks and the schema-validator contract
//! - [`transport`]: transport abstraction and the three reference variants
//! - [`engine`]: the protocol engine, correlator, and capability router
//! - [`registry`]: tool/prompt/resource/root registries
//! - [`auth`]: bearer-token gate and provider contract

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::uninlined_format_args)]

pub mod auth;
pub mod engine;
pub mod error;
pub mod messages;
pub mod registry;
pub mod transport;
pub mod validation;

// Re-export commonly used types for convenience
pub use auth::{gate, AuthProvider, Clock, InMemoryAuthProvider, SystemClock, TokenClaims};
pub use engine::{
    EngineConfig, NotificationHandler, ProgressSink, ProtocolEngine, ProtocolEngineBuilder,
    RequestOptions, Role, SessionState,
};
pub use error::{McpError, McpResult};
pub use messages::{
    Capabilities, Implementation, JsonRpcError, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, LogLevel, ProtocolVersion, RequestId,
};
pub use transport::{ByteStreamTransport, HttpSseTransport, InMemoryTransport, Transport};
pub use validation::{BasicSchemaValidator, SchemaValidator};

/// Current version of the mcp-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current MCP protocol version supported by this library
pub const PROTOCOL_VERSION: &str = "2024-11-05";
