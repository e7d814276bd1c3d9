//! Tool registry.
//!
//! Maps tool names to their definition and handler. Registration churn
//! (register, re-register, unregister) fires the list-changed observers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::{ObserverHandle, ObserverSet};
use crate::error::{McpResult, ValidationError};
use crate::messages::Tool;
use crate::validation;

/// Async tool handler: takes the validated params object, produces the raw
/// result value that travels back wrapped as `{"value": ...}`.
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, McpResult<Value>> + Send + Sync>;

/// A registered tool: definition plus handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// The tool definition
    pub tool: Tool,
    /// The handler invoked on dispatch
    pub handler: ToolHandler,
}

/// Registry of tools keyed by name.
pub struct ToolRegistry {
    tools: Mutex<BTreeMap<String, RegisteredTool>>,
    changed: ObserverSet<()>,
}

impl ToolRegistry {
    pub(crate) fn new() -> Self {
        Self {
            tools: Mutex::new(BTreeMap::new()),
            changed: ObserverSet::new(),
        }
    }

    /// Register a tool. The input schema must be an object schema.
    /// Re-registering a name replaces the previous entry.
    pub fn register(&self, tool: Tool, handler: ToolHandler) -> McpResult<()> {
        validation::require_object_schema(&tool.input_schema)
            .map_err(|e| ValidationError::SchemaValidation {
                reason: format!("Tool '{}': {e}", tool.name),
            })?;

        let name = tool.name.clone();
        self.tools
            .lock()
            .expect("tool registry poisoned")
            .insert(name.clone(), RegisteredTool { tool, handler });
        debug!(tool = %name, "tool registered");
        self.changed.emit(&());
        Ok(())
    }

    /// Remove a tool. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .tools
            .lock()
            .expect("tool registry poisoned")
            .remove(name)
            .is_some();
        if removed {
            debug!(tool = name, "tool unregistered");
            self.changed.emit(&());
        }
        removed
    }

    /// Names of the registered tools.
    pub fn names(&self) -> Vec<String> {
        self.tools
            .lock()
            .expect("tool registry poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<RegisteredTool> {
        self.tools
            .lock()
            .expect("tool registry poisoned")
            .get(name)
            .cloned()
    }

    /// Observe registration churn.
    pub fn on_list_changed(&self, observer: Arc<dyn Fn(&()) + Send + Sync>) -> ObserverHandle {
        self.changed.subscribe(observer)
    }
}
