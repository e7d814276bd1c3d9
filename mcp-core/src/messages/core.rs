//! Core JSON-RPC 2.0 message structures for MCP communication.
//!
//! This module provides the fundamental JSON-RPC message types that form the
//! foundation of all MCP communication. These types strictly follow the
//! JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: a method invocation that expects a response (has an `id`)
//! - **Response**: the reply to a request, carrying exactly one of result or error
//! - **Notification**: a one-way method invocation (no `id`, no reply)
//!
//! # Examples
//!
//! ```rust
//! use mcp_core::messages::{JsonRpcRequest, JsonRpcResponse, JsonRpcError};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(1, "tools/list", json!({}));
//! let response = JsonRpcResponse::success(1, json!({"tools": []}));
//! let failure = JsonRpcResponse::error(1, JsonRpcError::method_not_found("unknown"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID for JSON-RPC messages.
///
/// Either an integer or a string, per the JSON-RPC 2.0 specification. The
/// engine allocates monotonic integer ids for its own outbound requests but
/// accepts string ids from peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier
    Number(i64),
    /// String identifier
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        Self::Number(n as i64)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl RequestId {
    /// The numeric value, if this id is an integer.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(_) => None,
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Unique identifier for request/response correlation
    pub id: RequestId,

    /// Method name being invoked
    pub method: String,

    /// Parameters for the method (object or array)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request with the given ID, method, and parameters.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Create a new JSON-RPC request without parameters.
    pub fn without_params(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Deserialize the parameters into a concrete type.
    ///
    /// Absent parameters deserialize as JSON `null`, which lets option-like
    /// parameter structs default cleanly.
    pub fn params_as<T>(&self) -> Result<T, serde_json::Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        match &self.params {
            Some(params) => serde_json::from_value(params.clone()),
            None => serde_json::from_value(Value::Null),
        }
    }
}

/// JSON-RPC 2.0 response message.
///
/// Carries exactly one of `result` or `error`; the wire-shape validator
/// rejects frames that violate that exclusivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// ID from the corresponding request
    pub id: RequestId,

    /// Success result (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error result (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a successful response with the given result.
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response with the given error.
    pub fn error(id: impl Into<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Check if this response represents a success.
    pub fn is_success(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }

    /// Check if this response represents an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC 2.0 notification message.
///
/// One-way messages used for progress, cancellation, registry churn, and
/// log delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Method name being invoked
    pub method: String,

    /// Parameters for the method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification with the given method and parameters.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Create a new JSON-RPC notification without parameters.
    pub fn without_params(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: None,
        }
    }

    /// Deserialize the parameters into a concrete type.
    pub fn params_as<T>(&self) -> Result<T, serde_json::Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        match &self.params {
            Some(params) => serde_json::from_value(params.clone()),
            None => serde_json::from_value(Value::Null),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code
    pub code: i64,

    /// Human-readable error message
    pub message: String,

    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Parse error (-32700): the bytes were not valid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Invalid Request (-32600): the JSON was not a valid JSON-RPC message.
pub const INVALID_REQUEST: i64 = -32600;
/// Method not found (-32601).
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid params (-32602).
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error (-32603).
pub const INTERNAL_ERROR: i64 = -32603;
/// Server not initialized (-32002): a request arrived before the handshake.
pub const SERVER_NOT_INITIALIZED: i64 = -32002;
/// Request failed (-32001): application-level failure.
pub const REQUEST_FAILED: i64 = -32001;
/// Authorization error (-32401): auth-gate rejection.
pub const AUTHORIZATION_ERROR: i64 = -32401;

impl JsonRpcError {
    /// Create a new JSON-RPC error.
    pub fn new(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Create a "Parse error" (-32700).
    pub fn parse_error(details: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, "Parse error", Some(Value::String(details.into())))
    }

    /// Create an "Invalid Request" error (-32600).
    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(
            INVALID_REQUEST,
            "Invalid Request",
            Some(Value::String(details.into())),
        )
    }

    /// Create a "Method not found" error (-32601).
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            "Method not found",
            Some(Value::String(format!(
                "Method '{}' not found",
                method.into()
            ))),
        )
    }

    /// Create a "Method not found" error with a custom detail message.
    pub fn method_not_supported(details: impl Into<String>) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            "Method not found",
            Some(Value::String(details.into())),
        )
    }

    /// Create an "Invalid params" error (-32602).
    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            INVALID_PARAMS,
            "Invalid params",
            Some(Value::String(details.into())),
        )
    }

    /// Create an "Internal error" (-32603).
    pub fn internal_error(details: impl Into<String>) -> Self {
        Self::new(
            INTERNAL_ERROR,
            "Internal error",
            Some(Value::String(details.into())),
        )
    }

    /// Create a "Server not initialized" error (-32002).
    pub fn server_not_initialized() -> Self {
        Self::new(SERVER_NOT_INITIALIZED, "Server not initialized", None)
    }

    /// Create a "Request failed" error (-32001).
    pub fn request_failed(details: impl Into<String>) -> Self {
        Self::new(
            REQUEST_FAILED,
            "Request failed",
            Some(Value::String(details.into())),
        )
    }

    /// Create an authorization error (-32401) with the given message.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(AUTHORIZATION_ERROR, message, None)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC Error {}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, " ({data})")?;
        }
        Ok(())
    }
}

impl std::error::Error for JsonRpcError {}

/// Enum for any JSON-RPC message.
///
/// Deserialization tries request, then response, then notification, which
/// matches discrimination by field presence: `id` plus `method` is a
/// request, `id` without `method` is a response, `method` alone is a
/// notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Request message
    Request(JsonRpcRequest),
    /// Response message
    Response(JsonRpcResponse),
    /// Notification message
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Get the method name if this is a request or notification.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(notif) => Some(&notif.method),
            Self::Response(_) => None,
        }
    }

    /// Get the request ID if this is a request or response.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Response(resp) => Some(&resp.id),
            Self::Notification(_) => None,
        }
    }

    /// Check if this message expects a response.
    pub fn expects_response(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(req: JsonRpcRequest) -> Self {
        Self::Request(req)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(resp: JsonRpcResponse) -> Self {
        Self::Response(resp)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(notif: JsonRpcNotification) -> Self {
        Self::Notification(notif)
    }
}
