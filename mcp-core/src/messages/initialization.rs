//! MCP initialization and protocol negotiation message types.
//!
//! The handshake is two frames: the client sends an `initialize` request
//! carrying its protocol version, implementation info, and capabilities; the
//! server replies with the same three fields from its side. Version strings
//! are compared by equality and any mismatch aborts the session.

use serde::{Deserialize, Serialize};

use super::{Capabilities, Implementation, ProtocolVersion};

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Protocol version the client speaks
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,

    /// Client implementation details
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,

    /// Capabilities the client offers to the server
    pub capabilities: Capabilities,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResponse {
    /// Protocol version the server speaks
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,

    /// Server implementation details
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,

    /// Capabilities the server offers to the client
    pub capabilities: Capabilities,
}
