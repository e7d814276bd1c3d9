//! Prompt registry.
//!
//! Maps prompt names to their definition and optional executor. `get`
//! renders through a deterministic template step; `execute` runs the
//! registered executor.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::{ObserverHandle, ObserverSet};
use crate::error::{McpResult, ValidationError};
use crate::messages::{Prompt, PromptMessage};

/// Async prompt executor: argument values in, rendered messages out.
pub type PromptExecutor =
    Arc<dyn Fn(HashMap<String, Value>) -> BoxFuture<'static, McpResult<Vec<PromptMessage>>> + Send + Sync>;

/// A registered prompt: definition plus optional executor.
#[derive(Clone)]
pub struct RegisteredPrompt {
    /// The prompt definition
    pub prompt: Prompt,
    /// The executor invoked by `prompts/execute`, when one was registered
    pub executor: Option<PromptExecutor>,
}

/// Registry of prompts keyed by name.
pub struct PromptRegistry {
    prompts: Mutex<BTreeMap<String, RegisteredPrompt>>,
    changed: ObserverSet<()>,
}

impl PromptRegistry {
    pub(crate) fn new() -> Self {
        Self {
            prompts: Mutex::new(BTreeMap::new()),
            changed: ObserverSet::new(),
        }
    }

    /// Register a prompt, replacing any previous entry under the same name.
    pub fn register(&self, prompt: Prompt, executor: Option<PromptExecutor>) {
        let name = prompt.name.clone();
        self.prompts
            .lock()
            .expect("prompt registry poisoned")
            .insert(name.clone(), RegisteredPrompt { prompt, executor });
        debug!(prompt = %name, "prompt registered");
        self.changed.emit(&());
    }

    /// Remove a prompt. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .prompts
            .lock()
            .expect("prompt registry poisoned")
            .remove(name)
            .is_some();
        if removed {
            debug!(prompt = name, "prompt unregistered");
            self.changed.emit(&());
        }
        removed
    }

    /// All registered prompt definitions.
    pub fn list(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .expect("prompt registry poisoned")
            .values()
            .map(|entry| entry.prompt.clone())
            .collect()
    }

    /// Look up a prompt by name.
    pub fn get(&self, name: &str) -> Option<RegisteredPrompt> {
        self.prompts
            .lock()
            .expect("prompt registry poisoned")
            .get(name)
            .cloned()
    }

    /// Observe registration churn.
    pub fn on_list_changed(&self, observer: Arc<dyn Fn(&()) + Send + Sync>) -> ObserverHandle {
        self.changed.subscribe(observer)
    }
}

/// Reject the call when a required argument is missing.
pub fn check_required_arguments(
    prompt: &Prompt,
    arguments: &HashMap<String, Value>,
) -> Result<(), ValidationError> {
    for name in prompt.required_arguments() {
        if !arguments.contains_key(name) {
            return Err(ValidationError::MissingRequiredArgument {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Deterministic template rendering used by `prompts/get`.
///
/// Produces one user message: the prompt's description (or name) followed
/// by the supplied arguments in name order.
pub fn render_messages(prompt: &Prompt, arguments: &HashMap<String, Value>) -> Vec<PromptMessage> {
    let mut text = prompt
        .description
        .clone()
        .unwrap_or_else(|| prompt.name.clone());

    let mut names: Vec<&String> = arguments.keys().collect();
    names.sort();
    for name in names {
        let value = &arguments[name];
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.push_str(&format!("\n{name}: {rendered}"));
    }

    vec![PromptMessage::user(text)]
}
