//! Root-related message types.
//!
//! Roots are workspace URIs the client exposes to the server. They form a
//! set: adding an existing root is a no-op and never announced.

use serde::{Deserialize, Serialize};

/// Result of `roots/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRootsResponse {
    /// Current root URIs
    pub roots: Vec<String>,
}

/// Payload of `notifications/rootsChanged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootsChangedNotification {
    /// The full root set after the change
    pub roots: Vec<String>,
}
