//! Resource and resource-template registry.
//!
//! Two maps (URI to resource, URI template to template) plus a per-URI set
//! of content observers. Registering a new URI or removing one is listing
//! churn; re-registering an existing URI is a content mutation delivered to
//! that URI's observers as `notifications/resources/updated`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use super::{ObserverHandle, ObserverSet};
use crate::error::ValidationError;
use crate::messages::{
    Resource, ResourceDescriptor, ResourceTemplate, ResourceUpdatedNotification,
};

/// Callback invoked with each content mutation of a subscribed URI.
pub type ContentObserver = Arc<dyn Fn(&ResourceUpdatedNotification) + Send + Sync>;

struct ContentSubscribers {
    next_id: u64,
    by_uri: HashMap<String, Vec<(u64, ContentObserver)>>,
}

/// Registry of resources and templates keyed by URI.
pub struct ResourceRegistry {
    resources: Mutex<BTreeMap<String, Resource>>,
    templates: Mutex<BTreeMap<String, ResourceTemplate>>,
    changed: ObserverSet<()>,
    content: Arc<Mutex<ContentSubscribers>>,
}

impl ResourceRegistry {
    pub(crate) fn new() -> Self {
        Self {
            resources: Mutex::new(BTreeMap::new()),
            templates: Mutex::new(BTreeMap::new()),
            changed: ObserverSet::new(),
            content: Arc::new(Mutex::new(ContentSubscribers {
                next_id: 1,
                by_uri: HashMap::new(),
            })),
        }
    }

    /// Register a resource. A new URI is listing churn; an existing URI is a
    /// content mutation pushed to that URI's subscribers.
    pub fn register(&self, resource: Resource) {
        let uri = resource.uri.clone();
        let replaced = self
            .resources
            .lock()
            .expect("resource registry poisoned")
            .insert(uri.clone(), resource.clone())
            .is_some();

        if replaced {
            debug!(uri = %uri, "resource content updated");
            let update = ResourceUpdatedNotification {
                uri: uri.clone(),
                content: resource.text,
            };
            let observers: Vec<ContentObserver> = {
                let subs = self.content.lock().expect("content subscribers poisoned");
                subs.by_uri
                    .get(&uri)
                    .map(|list| list.iter().map(|(_, o)| o.clone()).collect())
                    .unwrap_or_default()
            };
            for observer in observers {
                observer(&update);
            }
        } else {
            debug!(uri = %uri, "resource registered");
            self.changed.emit(&());
        }
    }

    /// Remove a resource along with its content subscribers.
    pub fn unregister(&self, uri: &str) -> bool {
        let removed = self
            .resources
            .lock()
            .expect("resource registry poisoned")
            .remove(uri)
            .is_some();
        if removed {
            debug!(uri, "resource unregistered");
            self.content
                .lock()
                .expect("content subscribers poisoned")
                .by_uri
                .remove(uri);
            self.changed.emit(&());
        }
        removed
    }

    /// Register a URI template, replacing any previous entry.
    pub fn register_template(&self, template: ResourceTemplate) {
        let key = template.uri_template.clone();
        self.templates
            .lock()
            .expect("template registry poisoned")
            .insert(key.clone(), template);
        debug!(uri_template = %key, "resource template registered");
        self.changed.emit(&());
    }

    /// Remove a URI template.
    pub fn unregister_template(&self, uri_template: &str) -> bool {
        let removed = self
            .templates
            .lock()
            .expect("template registry poisoned")
            .remove(uri_template)
            .is_some();
        if removed {
            self.changed.emit(&());
        }
        removed
    }

    /// Read a resource by URI.
    pub fn read(&self, uri: &str) -> Option<Resource> {
        self.resources
            .lock()
            .expect("resource registry poisoned")
            .get(uri)
            .cloned()
    }

    /// Listing metadata for every registered resource.
    pub fn list(&self) -> Vec<ResourceDescriptor> {
        self.resources
            .lock()
            .expect("resource registry poisoned")
            .values()
            .map(|r| ResourceDescriptor {
                uri: r.uri.clone(),
                mime_type: r.mime_type.clone(),
            })
            .collect()
    }

    /// Every registered template.
    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        self.templates
            .lock()
            .expect("template registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Subscribe to content mutations of one URI.
    ///
    /// Fails when the URI is not registered. The returned handle detaches
    /// the subscriber on drop, which is what makes unsubscribe work.
    pub fn subscribe_content(
        &self,
        uri: &str,
        observer: ContentObserver,
    ) -> Result<ObserverHandle, ValidationError> {
        if self.read(uri).is_none() {
            return Err(ValidationError::InvalidParams {
                reason: format!("Unknown resource: {uri}"),
            });
        }

        let mut subs = self.content.lock().expect("content subscribers poisoned");
        let id = subs.next_id;
        subs.next_id += 1;
        subs.by_uri
            .entry(uri.to_string())
            .or_default()
            .push((id, observer));

        let weak: Weak<Mutex<ContentSubscribers>> = Arc::downgrade(&self.content);
        let uri = uri.to_string();
        Ok(ObserverHandle {
            detach: Some(Box::new(move || {
                if let Some(subs) = weak.upgrade() {
                    if let Ok(mut subs) = subs.lock() {
                        let emptied = match subs.by_uri.get_mut(&uri) {
                            Some(list) => {
                                list.retain(|(oid, _)| *oid != id);
                                list.is_empty()
                            }
                            None => false,
                        };
                        if emptied {
                            subs.by_uri.remove(&uri);
                        }
                    }
                }
            })),
        })
    }

    /// Observe listing churn (resource or template registration changes).
    pub fn on_list_changed(&self, observer: Arc<dyn Fn(&()) + Send + Sync>) -> ObserverHandle {
        self.changed.subscribe(observer)
    }
}
