//! MCP (Model Context Protocol) message types and JSON-RPC structures.
//!
//! This module provides complete type definitions for all MCP messages,
//! organized by protocol area:
//!
//! - **Core**: JSON-RPC request/response/notification framing
//! - **Initialization**: protocol version negotiation and capability exchange
//! - **Tools**: tool discovery and invocation
//! - **Prompts**: prompt templates and execution
//! - **Resources**: URI-addressed content, templates, and subscriptions
//! - **Roots**: workspace roots exposed by the client
//! - **Sampling**: LLM message creation and completion suggestions
//! - **Logging**: wire-level log delivery, progress, and cancellation
//!
//! All message types are plain serde structs; `params` and results that the
//! protocol leaves open-ended stay `serde_json::Value`.

pub mod core;
pub mod initialization;
pub mod logging;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use self::core::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use initialization::{InitializeRequest, InitializeResponse};
pub use logging::{
    CancelledNotification, LogLevel, LogMessageNotification, ProgressNotification,
    SetLevelRequest,
};
pub use prompts::{
    GetPromptRequest, GetPromptResponse, ListPromptsResponse, MessageRole, Prompt,
    PromptArgument, PromptContent, PromptMessage,
};
pub use resources::{
    ListResourceTemplatesResponse, ListResourcesResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceContents, ResourceDescriptor, ResourceTemplate,
    ResourceUpdatedNotification, SubscribeResourceRequest, UnsubscribeResourceRequest,
};
pub use roots::{ListRootsResponse, RootsChangedNotification};
pub use sampling::{
    CompleteRequest, CompleteResponse, CompletionArgument, CompletionResult,
    CreateMessageRequest, CreateMessageResponse, MessageCreatedNotification, ModelPreferences,
    SamplingContent, SamplingMessage,
};
pub use tools::{ListToolsResponse, Tool, ToolInvocationResult};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// MCP protocol version identifier.
///
/// Versions are date strings compared by equality; anything other than the
/// latest supported version is rejected during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// MCP protocol version 2024-11-05 (latest supported)
    #[serde(rename = "2024-11-05")]
    V2024_11_05,

    /// Unrecognized version string, kept verbatim for diagnostics
    #[serde(untagged)]
    Other(String),
}

impl ProtocolVersion {
    /// The latest protocol version this engine speaks.
    pub const LATEST: ProtocolVersion = ProtocolVersion::V2024_11_05;

    /// Get the string representation of the protocol version.
    pub fn as_str(&self) -> &str {
        match self {
            Self::V2024_11_05 => "2024-11-05",
            Self::Other(version) => version,
        }
    }

    /// Check if this version is supported by the current implementation.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::V2024_11_05)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability set advertised by a peer during initialization.
///
/// Each field gates a protocol area; an absent field means the peer does not
/// serve that area at all. Both client and server use the same shape since
/// the engine is symmetric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Capabilities {
    /// Serves tool listing and invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    /// Serves prompt listing, fetching, and execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,

    /// Serves resource listing, reading, and subscriptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    /// Exposes workspace roots (client side)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,

    /// Answers sampling requests (client side)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,

    /// Emits wire-level log messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,

    /// Experimental, implementation-defined capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

/// Tool-related capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ToolsCapability {
    /// Whether tool registration churn emits `notifications/tools/list_changed`
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Prompt-related capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PromptsCapability {
    /// Whether prompt registration churn emits `notifications/prompts/list_changed`
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource-related capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourcesCapability {
    /// Whether per-URI content subscriptions are served
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,

    /// Whether resource registration churn emits `notifications/resources/list_changed`
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Roots-related capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RootsCapability {
    /// Whether root churn emits `notifications/rootsChanged`
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Sampling-related capabilities. Contents are implementation-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SamplingCapability {
    /// Implementation-defined sampling options
    #[serde(flatten)]
    pub options: HashMap<String, Value>,
}

/// Logging-related capabilities. Presence alone enables the area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoggingCapability {
    /// Implementation-defined logging options
    #[serde(flatten)]
    pub options: HashMap<String, Value>,
}

impl Capabilities {
    /// Start from an empty capability set and build up with the `with_*` helpers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise tools, optionally with list-change notifications.
    pub fn with_tools(mut self, list_changed: bool) -> Self {
        self.tools = Some(ToolsCapability {
            list_changed: Some(list_changed),
        });
        self
    }

    /// Advertise prompts, optionally with list-change notifications.
    pub fn with_prompts(mut self, list_changed: bool) -> Self {
        self.prompts = Some(PromptsCapability {
            list_changed: Some(list_changed),
        });
        self
    }

    /// Advertise resources with subscription and list-change settings.
    pub fn with_resources(mut self, subscribe: bool, list_changed: bool) -> Self {
        self.resources = Some(ResourcesCapability {
            subscribe: Some(subscribe),
            list_changed: Some(list_changed),
        });
        self
    }

    /// Advertise roots, optionally with list-change notifications.
    pub fn with_roots(mut self, list_changed: bool) -> Self {
        self.roots = Some(RootsCapability {
            list_changed: Some(list_changed),
        });
        self
    }

    /// Advertise sampling support.
    pub fn with_sampling(mut self) -> Self {
        self.sampling = Some(SamplingCapability::default());
        self
    }

    /// Advertise wire-level logging.
    pub fn with_logging(mut self) -> Self {
        self.logging = Some(LoggingCapability::default());
        self
    }

    /// Whether the tools area is served at all.
    pub fn supports_tools(&self) -> bool {
        self.tools.is_some()
    }

    /// Whether tool churn should be announced.
    pub fn tools_list_changed(&self) -> bool {
        self.tools
            .as_ref()
            .and_then(|t| t.list_changed)
            .unwrap_or(false)
    }

    /// Whether the prompts area is served.
    pub fn supports_prompts(&self) -> bool {
        self.prompts.is_some()
    }

    /// Whether prompt churn should be announced.
    pub fn prompts_list_changed(&self) -> bool {
        self.prompts
            .as_ref()
            .and_then(|p| p.list_changed)
            .unwrap_or(false)
    }

    /// Whether the resources area is served.
    pub fn supports_resources(&self) -> bool {
        self.resources.is_some()
    }

    /// Whether resource churn should be announced.
    pub fn resources_list_changed(&self) -> bool {
        self.resources
            .as_ref()
            .and_then(|r| r.list_changed)
            .unwrap_or(false)
    }

    /// Whether per-URI content subscriptions are served.
    pub fn resources_subscribe(&self) -> bool {
        self.resources
            .as_ref()
            .and_then(|r| r.subscribe)
            .unwrap_or(false)
    }

    /// Whether the roots area is served.
    pub fn supports_roots(&self) -> bool {
        self.roots.is_some()
    }

    /// Whether root churn should be announced.
    pub fn roots_list_changed(&self) -> bool {
        self.roots
            .as_ref()
            .and_then(|r| r.list_changed)
            .unwrap_or(false)
    }

    /// Whether sampling requests are answered.
    pub fn supports_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    /// Whether wire-level logging is served.
    pub fn supports_logging(&self) -> bool {
        self.logging.is_some()
    }
}

/// Implementation information for a client or server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    /// Name of the implementation
    pub name: String,

    /// Version of the implementation
    pub version: String,

    /// Additional implementation metadata
    #[serde(flatten)]
    pub metadata: HashMap<String, Value>,
}

impl Implementation {
    /// Create a new implementation info structure.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Progress token attached to a request via `params._meta.progressToken`.
///
/// The requester allocates the token and the peer echoes it verbatim in
/// `notifications/progress`, so progress can be routed without exposing
/// request ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// Numeric progress token
    Number(i64),
    /// String-based progress token
    String(String),
}

impl From<String> for ProgressToken {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ProgressToken {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for ProgressToken {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}
