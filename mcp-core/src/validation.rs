//! Message-shape and parameter validation.
//!
//! Two validators live here:
//!
//! - [`parse_message`] / [`validate_message`] enforce the JSON-RPC 2.0 wire
//!   shape before anything reaches the dispatch loop: `jsonrpc` must equal
//!   "2.0", requests and notifications are discriminated by the presence of
//!   `id`, and responses must carry exactly one of `result` or `error`.
//! - [`SchemaValidator`] is the pluggable contract used to check tool
//!   parameters against the tool's input schema. [`BasicSchemaValidator`]
//!   is the built-in structural implementation; embedders can swap in a
//!   full JSON Schema engine behind the same trait.

use serde_json::Value;

use crate::error::{ProtocolError, ValidationError};
use crate::messages::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Parse a decoded JSON value into a validated JSON-RPC message.
///
/// Discrimination happens by field presence, not by serde's untagged
/// fallback order, so malformed frames produce a precise error instead of
/// the nearest-matching variant.
pub fn parse_message(value: Value) -> Result<JsonRpcMessage, ProtocolError> {
    let object = value
        .as_object()
        .ok_or_else(|| ProtocolError::InvalidJsonRpc {
            reason: "Message must be a JSON object".to_string(),
        })?;

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some("2.0") => {}
        Some(other) => {
            return Err(ProtocolError::InvalidJsonRpc {
                reason: format!("Unsupported jsonrpc version: {other}"),
            })
        }
        None => {
            return Err(ProtocolError::InvalidJsonRpc {
                reason: "Missing jsonrpc version field".to_string(),
            })
        }
    }

    let has_id = object.contains_key("id");
    let has_method = object.contains_key("method");

    let parsed = if has_method && has_id {
        serde_json::from_value::<JsonRpcRequest>(value).map(JsonRpcMessage::Request)
    } else if has_method {
        serde_json::from_value::<JsonRpcNotification>(value).map(JsonRpcMessage::Notification)
    } else if has_id {
        let response: JsonRpcResponse =
            serde_json::from_value(value).map_err(|e| ProtocolError::InvalidJsonRpc {
                reason: format!("Malformed response: {e}"),
            })?;
        if response.result.is_some() == response.error.is_some() {
            return Err(ProtocolError::InvalidJsonRpc {
                reason: "Response must carry exactly one of result or error".to_string(),
            });
        }
        return Ok(JsonRpcMessage::Response(response));
    } else {
        return Err(ProtocolError::InvalidJsonRpc {
            reason: "Message has neither method nor id".to_string(),
        });
    };

    parsed.map_err(|e| ProtocolError::InvalidJsonRpc {
        reason: format!("Malformed message: {e}"),
    })
}

/// Validate an already-typed message against the same shape rules.
pub fn validate_message(message: &JsonRpcMessage) -> Result<(), ProtocolError> {
    let version = match message {
        JsonRpcMessage::Request(req) => &req.jsonrpc,
        JsonRpcMessage::Response(resp) => {
            if resp.result.is_some() == resp.error.is_some() {
                return Err(ProtocolError::InvalidJsonRpc {
                    reason: "Response must carry exactly one of result or error".to_string(),
                });
            }
            &resp.jsonrpc
        }
        JsonRpcMessage::Notification(notif) => &notif.jsonrpc,
    };

    if version != "2.0" {
        return Err(ProtocolError::InvalidJsonRpc {
            reason: format!("Unsupported jsonrpc version: {version}"),
        });
    }
    Ok(())
}

/// Pluggable schema validation for tool parameters.
///
/// The engine treats the validator as opaque: it hands over the registered
/// input schema and the incoming params and forwards any rejection message
/// to the caller as Invalid params.
pub trait SchemaValidator: Send + Sync {
    /// Check `instance` against `schema`; `Err` carries the rejection message.
    fn validate(&self, schema: &Value, instance: &Value) -> Result<(), String>;
}

/// Structural schema validator.
///
/// Covers the subset of JSON Schema the registries rely on: top-level type
/// assertion, `properties` type checks, and `required` membership. Unknown
/// keywords are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSchemaValidator;

impl BasicSchemaValidator {
    fn type_matches(expected: &str, value: &Value) -> bool {
        match expected {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            _ => true,
        }
    }
}

impl SchemaValidator for BasicSchemaValidator {
    fn validate(&self, schema: &Value, instance: &Value) -> Result<(), String> {
        let Some(schema_obj) = schema.as_object() else {
            return Err("Schema must be a JSON object".to_string());
        };

        if let Some(expected) = schema_obj.get("type").and_then(Value::as_str) {
            if !Self::type_matches(expected, instance) {
                return Err(format!("Expected {expected}, got {instance}"));
            }
        }

        let instance_obj = instance.as_object();

        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                let present = instance_obj.map(|o| o.contains_key(name)).unwrap_or(false);
                if !present {
                    return Err(format!("Missing required property: {name}"));
                }
            }
        }

        if let (Some(properties), Some(instance_obj)) = (
            schema_obj.get("properties").and_then(Value::as_object),
            instance_obj,
        ) {
            for (name, property_schema) in properties {
                if let Some(value) = instance_obj.get(name) {
                    if let Some(expected) = property_schema.get("type").and_then(Value::as_str) {
                        if !Self::type_matches(expected, value) {
                            return Err(format!(
                                "Property '{name}' expected {expected}, got {value}"
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Check that a tool's input schema is an object schema, the only shape the
/// protocol permits for tool parameters.
pub fn require_object_schema(schema: &Value) -> Result<(), ValidationError> {
    let is_object_schema = schema
        .as_object()
        .and_then(|o| o.get("type"))
        .and_then(Value::as_str)
        == Some("object");
    if is_object_schema {
        Ok(())
    } else {
        Err(ValidationError::SchemaValidation {
            reason: "Tool input schema must have type \"object\"".to_string(),
        })
    }
}
