//! Error types for MCP (Model Context Protocol) operations.
//!
//! This module provides comprehensive error handling for all MCP operations,
//! including transport-specific errors, protocol errors, validation errors,
//! and authorization errors.
//!
//! # Design Philosophy
//!
//! The error system is designed to be:
//! - **Informative**: Provide clear, actionable error messages
//! - **Structured**: Use strongly-typed error variants for programmatic handling
//! - **Wire-aware**: Every error can be lowered to a JSON-RPC error object with
//!   the correct error code when a reply has to go on the wire

use thiserror::Error;

use crate::messages::JsonRpcError;

/// The main error type for all MCP operations.
///
/// This enum covers all failure conditions the engine can encounter, from
/// transport failures to protocol violations and handler execution errors.
///
/// # Examples
///
/// ```rust
/// use mcp_core::error::{McpError, TransportError};
///
/// let error = McpError::Transport(TransportError::NotConnected {
///     transport_type: "in-memory".to_string(),
/// });
///
/// println!("Error: {}", error);
/// ```
#[derive(Error, Debug)]
pub enum McpError {
    /// Transport-related errors (connection, delivery, decoding off the wire)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol-level errors (invalid messages, handshake failures, timeouts)
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Validation errors (schema mismatches, capability gates, bad params)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Authentication and authorization errors
    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        /// The underlying serde_json error
        source: serde_json::Error,
    },

    /// IO errors (stream operations, process management)
    #[error("IO error: {source}")]
    Io {
        #[from]
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Generic errors for cases not covered by specific variants
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

/// Transport-specific errors shared by all transport variants.
#[derive(Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum TransportError {
    /// Failed to establish the underlying connection
    #[error("Failed to connect {transport_type} transport: {reason}")]
    ConnectionFailed {
        transport_type: String,
        reason: String,
    },

    /// `connect` called on a transport that is already connected
    #[error("Transport already connected ({transport_type})")]
    AlreadyConnected { transport_type: String },

    /// Operation attempted while the transport is not connected
    #[error("Transport not connected ({transport_type})")]
    NotConnected { transport_type: String },

    /// The connection was lost while in use
    #[error("Connection lost ({transport_type}): {reason}")]
    ConnectionLost {
        transport_type: String,
        reason: String,
    },

    /// Failed to hand a message to the peer
    #[error("Failed to send message via {transport_type}: {reason}")]
    SendFailed {
        transport_type: String,
        reason: String,
    },

    /// HTTP-level failure from the POST half of the SSE transport
    #[error("HTTP error: {status_code} - {reason}")]
    HttpError { status_code: u16, reason: String },

    /// Event-stream failure from the SSE transport
    #[error("SSE error: {reason}")]
    SseError { reason: String },

    /// Child-process failure from the byte-stream transport
    #[error("Process error: {reason}")]
    ProcessError { reason: String },

    /// Transport configuration is unusable
    #[error("Invalid {transport_type} configuration: {reason}")]
    InvalidConfig {
        transport_type: String,
        reason: String,
    },
}

/// Protocol-level errors related to MCP message handling and session state.
#[derive(Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum ProtocolError {
    /// Bytes decoded into JSON that is not a valid JSON-RPC 2.0 message
    #[error("Invalid JSON-RPC message: {reason}")]
    InvalidJsonRpc { reason: String },

    /// Handshake negotiated incompatible protocol versions
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    /// `connect` called on an engine that already ran its handshake
    #[error("Engine already initialized")]
    AlreadyInitialized,

    /// Operation attempted before the handshake completed
    #[error("Session not initialized: {reason}")]
    NotInitialized { reason: String },

    /// The handshake failed before reaching the Ready state
    #[error("Initialization failed: {reason}")]
    InitializationFailed { reason: String },

    /// An outstanding request hit its deadline
    #[error("Request timed out after {millis}ms")]
    RequestTimeout { millis: u64 },

    /// An outstanding request was cancelled, locally or by the peer
    #[error("Request cancelled: {reason}")]
    RequestCancelled { reason: String },

    /// The peer answered a request with a JSON-RPC error object
    #[error("Server error {code}: {message}")]
    ServerError { code: i64, message: String },

    /// The peer's response could not be interpreted
    #[error("Invalid response: {reason}")]
    InvalidResponse { reason: String },
}

/// Validation errors for capabilities, schemas, and method parameters.
#[derive(Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum ValidationError {
    /// A capability gate rejected the call before any wire traffic.
    ///
    /// The reason carries the user-facing message verbatim, e.g.
    /// "Server does not support tool listing".
    #[error("{reason}")]
    UnsupportedCapability { reason: String },

    /// Parameters failed validation against a tool's input schema
    #[error("Schema validation failed: {reason}")]
    SchemaValidation { reason: String },

    /// A prompt was invoked without one of its required arguments
    #[error("Missing required argument: {name}")]
    MissingRequiredArgument { name: String },

    /// Method parameters are malformed or missing
    #[error("Invalid params: {reason}")]
    InvalidParams { reason: String },
}

/// Authentication and authorization errors.
///
/// These map onto JSON-RPC code -32401 when they have to cross the wire.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// The request carried no `token` parameter
    #[error("No authorization token provided")]
    MissingToken,

    /// Token failed validation
    #[error("Invalid token: {reason}")]
    InvalidToken {
        /// Why the token was rejected
        reason: String,
    },

    /// Token `exp` is in the past relative to the injected clock
    #[error("Token expired")]
    TokenExpired,

    /// The token's roles do not intersect the handler's required roles
    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

/// Convenience type alias for Results using McpError.
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    /// Create a new internal error with a custom message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the error category for this error.
    ///
    /// Useful for error reporting and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            McpError::Transport(_) => "transport",
            McpError::Protocol(_) => "protocol",
            McpError::Validation(_) => "validation",
            McpError::Auth(_) => "auth",
            McpError::Serialization { .. } => "serialization",
            McpError::Io { .. } => "io",
            McpError::Internal { .. } => "internal",
        }
    }

    /// Lower this error to a JSON-RPC error object for a wire reply.
    ///
    /// Authorization errors keep code -32401, validation errors become
    /// Invalid params (-32602), lifecycle violations become Server not
    /// initialized (-32002), explicit peer errors pass through unchanged,
    /// and everything else collapses to Internal error (-32603).
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            McpError::Auth(err) => JsonRpcError::authorization(err.to_string()),
            McpError::Validation(err) => JsonRpcError::invalid_params(err.to_string()),
            McpError::Protocol(ProtocolError::NotInitialized { .. }) => {
                JsonRpcError::server_not_initialized()
            }
            McpError::Protocol(ProtocolError::ServerError { code, message }) => {
                JsonRpcError::new(*code, message.clone(), None)
            }
            McpError::Protocol(ProtocolError::InvalidJsonRpc { reason }) => {
                JsonRpcError::invalid_request(reason.clone())
            }
            other => JsonRpcError::internal_error(other.to_string()),
        }
    }
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        // Keep string detail from the wire error's data field; losing it
        // would reduce "Invalid params: Missing required argument: x" to
        // just "Invalid params".
        let message = match &err.data {
            Some(serde_json::Value::String(detail)) => format!("{}: {}", err.message, detail),
            _ => err.message,
        };
        McpError::Protocol(ProtocolError::ServerError {
            code: err.code,
            message,
        })
    }
}
