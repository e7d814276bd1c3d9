//! Roots registry.
//!
//! An ordered set of root URIs with set semantics: adding an existing root
//! is a no-op and fires nothing. Observers receive the full root list after
//! each effective change, which is also the notification payload.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{ObserverHandle, ObserverSet};

/// Registry of workspace root URIs.
pub struct RootsRegistry {
    roots: Mutex<BTreeSet<String>>,
    changed: ObserverSet<Vec<String>>,
}

impl RootsRegistry {
    pub(crate) fn new() -> Self {
        Self {
            roots: Mutex::new(BTreeSet::new()),
            changed: ObserverSet::new(),
        }
    }

    /// Add a root. Returns false (and stays silent) when it already exists.
    pub fn add(&self, uri: impl Into<String>) -> bool {
        let uri = uri.into();
        let added = self.roots.lock().expect("roots registry poisoned").insert(uri.clone());
        if added {
            debug!(uri = %uri, "root added");
            self.changed.emit(&self.list());
        }
        added
    }

    /// Remove a root. Returns whether it existed.
    pub fn remove(&self, uri: &str) -> bool {
        let removed = self.roots.lock().expect("roots registry poisoned").remove(uri);
        if removed {
            debug!(uri, "root removed");
            self.changed.emit(&self.list());
        }
        removed
    }

    /// The current root set, ordered.
    pub fn list(&self) -> Vec<String> {
        self.roots
            .lock()
            .expect("roots registry poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Observe effective changes; the event is the new root list.
    pub fn on_changed(
        &self,
        observer: Arc<dyn Fn(&Vec<String>) + Send + Sync>,
    ) -> ObserverHandle {
        self.changed.subscribe(observer)
    }
}
