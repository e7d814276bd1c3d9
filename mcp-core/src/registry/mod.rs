//! Capability registries.
//!
//! Four sibling registries back the router: tools, prompts, resources (with
//! templates), and roots. Each offers register/unregister/list/get plus an
//! observer set that fires synchronously inside the mutation critical
//! section — observers are expected to only enqueue work (the engine's
//! observers push notifications onto its outbound queue).
//!
//! Observer registration returns an [`ObserverHandle`]; dropping the handle
//! detaches the observer, the same handle-based discipline the transports
//! use for subscribers.

pub mod prompts;
pub mod resources;
pub mod roots;
pub mod tools;

pub use prompts::{PromptExecutor, PromptRegistry, RegisteredPrompt};
pub use resources::ResourceRegistry;
pub use roots::RootsRegistry;
pub use tools::{RegisteredTool, ToolHandler, ToolRegistry};

use std::sync::{Arc, Mutex, Weak};

struct ObserverInner<E> {
    next_id: u64,
    observers: Vec<(u64, Arc<dyn Fn(&E) + Send + Sync>)>,
}

/// A set of observers for one event type.
pub(crate) struct ObserverSet<E> {
    inner: Arc<Mutex<ObserverInner<E>>>,
}

impl<E: Send + 'static> ObserverSet<E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ObserverInner {
                next_id: 1,
                observers: Vec::new(),
            })),
        }
    }

    pub(crate) fn subscribe(&self, observer: Arc<dyn Fn(&E) + Send + Sync>) -> ObserverHandle {
        let mut inner = self.inner.lock().expect("observer set poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.push((id, observer));

        let weak: Weak<Mutex<ObserverInner<E>>> = Arc::downgrade(&self.inner);
        ObserverHandle {
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if let Ok(mut inner) = inner.lock() {
                        inner.observers.retain(|(oid, _)| *oid != id);
                    }
                }
            })),
        }
    }

    /// Invoke every observer with the event, in registration order.
    pub(crate) fn emit(&self, event: &E) {
        let observers: Vec<Arc<dyn Fn(&E) + Send + Sync>> = {
            let inner = self.inner.lock().expect("observer set poisoned");
            inner.observers.iter().map(|(_, o)| o.clone()).collect()
        };
        for observer in observers {
            observer(event);
        }
    }
}

/// Handle identifying one registered observer; drop to detach.
pub struct ObserverHandle {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle").finish_non_exhaustive()
    }
}

impl ObserverHandle {
    /// Explicitly detach the observer.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}
