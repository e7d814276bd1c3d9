//! Wire-level logging, progress, and cancellation message types.
//!
//! These notifications are the out-of-band traffic of a session: log
//! messages filtered by a per-session severity threshold, progress updates
//! routed by token, and cancellation of outstanding requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::core::RequestId;
use super::ProgressToken;

/// Log severity, ordered from most to least verbose.
///
/// The derived `Ord` gives the threshold comparison used by the logging
/// filter: a message passes when its level is at or above the configured
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug level (most verbose)
    Debug,
    /// Informational
    Info,
    /// Normal but significant
    Notice,
    /// Warning conditions
    Warning,
    /// Error conditions
    Error,
    /// Critical conditions
    Critical,
    /// Action must be taken immediately
    Alert,
    /// System unusable (least verbose)
    Emergency,
}

impl LogLevel {
    /// All levels in severity order.
    pub fn all() -> [Self; 8] {
        [
            Self::Debug,
            Self::Info,
            Self::Notice,
            Self::Warning,
            Self::Error,
            Self::Critical,
            Self::Alert,
            Self::Emergency,
        ]
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

/// Parameters of `logging/setLevel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLevelRequest {
    /// The new threshold
    pub level: LogLevel,
}

/// Payload of `notifications/message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessageNotification {
    /// Severity of the message
    pub level: LogLevel,

    /// Optional logger name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,

    /// The log payload
    pub data: Value,
}

/// Payload of `notifications/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressNotification {
    /// Token identifying the request this progress belongs to
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,

    /// Work completed so far
    pub progress: f64,

    /// Total work, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

/// Payload of `notifications/cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledNotification {
    /// Id of the request being cancelled
    #[serde(rename = "requestId")]
    pub request_id: RequestId,

    /// Why the request was cancelled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
