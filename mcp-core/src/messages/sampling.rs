//! Sampling-related message types.
//!
//! Sampling reverses the usual flow: the server asks the client-side LLM
//! host to produce a message. The engine only marshals the exchange; the
//! actual model sits behind a handler trait. Completion suggestions for
//! prompt/resource arguments ride along in this protocol area.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::prompts::MessageRole;

/// Content of a sampling message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SamplingContent {
    /// Plain text content
    Text {
        /// The text body
        text: String,
    },
}

impl SamplingContent {
    /// Create text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// One message in a sampling conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// Who speaks this message
    pub role: MessageRole,

    /// The message body
    pub content: SamplingContent,
}

impl SamplingMessage {
    /// Create a user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: SamplingContent::text(text),
        }
    }

    /// Create an assistant message with text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: SamplingContent::text(text),
        }
    }
}

/// Model selection hints for a sampling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelPreferences {
    /// Preferred model name fragments, strongest first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<String>>,

    /// Relative priority of low cost (0.0 to 1.0)
    #[serde(rename = "costPriority", skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,

    /// Relative priority of low latency (0.0 to 1.0)
    #[serde(rename = "speedPriority", skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,

    /// Relative priority of model capability (0.0 to 1.0)
    #[serde(
        rename = "intelligencePriority",
        skip_serializing_if = "Option::is_none"
    )]
    pub intelligence_priority: Option<f64>,
}

/// Parameters of `sampling/createMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    /// Conversation so far
    pub messages: Vec<SamplingMessage>,

    /// Model selection hints
    #[serde(rename = "modelPreferences", skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,

    /// System prompt to frame the conversation
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Which MCP context to include ("none", "thisServer", "allServers")
    #[serde(rename = "includeContext", skip_serializing_if = "Option::is_none")]
    pub include_context: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate
    #[serde(rename = "maxTokens")]
    pub max_tokens: u64,

    /// Stop sequences
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Provider-specific metadata, opaque to the engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Result of `sampling/createMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMessageResponse {
    /// The message the host model produced
    pub message: SamplingMessage,
}

/// Payload of `notifications/messageCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCreatedNotification {
    /// The message that was created
    pub message: SamplingMessage,
}

/// The argument being completed in a `completion/complete` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionArgument {
    /// Argument name
    pub name: String,

    /// Partial value typed so far
    pub value: String,
}

/// Parameters of `completion/complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// What is being completed (prompt or resource reference)
    #[serde(rename = "ref")]
    pub reference: Value,

    /// The argument and its partial value
    pub argument: CompletionArgument,
}

/// Completion suggestions. `values` is capped at 100 entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Suggested values (at most 100)
    pub values: Vec<String>,

    /// Total number of matches, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    /// Whether more matches exist beyond `values`
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// Result of `completion/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteResponse {
    /// The suggestions
    pub completion: CompletionResult,
}
