//! Resource-related message types for MCP resource discovery and access.
//!
//! Resources are URI-addressed pieces of text content. Peers can list them,
//! read them, and subscribe to per-URI change notifications. Templates
//! describe families of resources through URI templates.

use serde::{Deserialize, Serialize};

/// A registered resource: URI, MIME type, and its current text content.
///
/// Re-registering the same URI replaces the content and counts as a content
/// mutation for subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique URI of the resource
    pub uri: String,

    /// MIME type of the content
    #[serde(rename = "mimeType")]
    pub mime_type: String,

    /// Current text content
    pub text: String,
}

impl Resource {
    /// Create a resource.
    pub fn new(
        uri: impl Into<String>,
        mime_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
            text: text.into(),
        }
    }
}

/// Listing entry for `resources/list`: metadata without the content body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Unique URI of the resource
    pub uri: String,

    /// MIME type of the content
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// A URI template describing a family of resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// Unique URI template (RFC 6570 style)
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,

    /// MIME type of resources produced from this template
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Result of `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResourcesResponse {
    /// All registered resources
    pub resources: Vec<ResourceDescriptor>,
}

/// Result of `resources/templates/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResourceTemplatesResponse {
    /// All registered templates
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplate>,
}

/// Parameters of `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    /// URI of the resource to read
    pub uri: String,
}

/// One content entry inside a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContents {
    /// URI the content belongs to
    pub uri: String,

    /// MIME type of the content
    #[serde(rename = "mimeType")]
    pub mime_type: String,

    /// Text content
    pub text: String,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResourceResponse {
    /// The resource content entries
    pub contents: Vec<ResourceContents>,
}

/// Parameters of `resources/subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResourceRequest {
    /// URI to watch for content changes
    pub uri: String,
}

/// Parameters of `resources/unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeResourceRequest {
    /// URI to stop watching
    pub uri: String,
}

/// Payload of `notifications/resources/updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUpdatedNotification {
    /// URI whose content changed
    pub uri: String,

    /// The new content
    pub content: String,
}
