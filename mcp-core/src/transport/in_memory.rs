//! In-memory transport for same-process peers and tests.
//!
//! Two modes:
//!
//! - [`InMemoryTransport::create_linked_pair`] returns two transports where
//!   each side's `send` delivers to the *other* side's subscribers. When the
//!   peer is not connected the message is dropped silently.
//! - A lone transport built with [`InMemoryTransport::new`] fans `send` out
//!   to its own local subscribers, which is what loopback-style test suites
//!   expect.
//!
//! Every sent message is also recorded and can be inspected through
//! [`InMemoryTransport::sent_messages`], which makes frame-level assertions
//! in tests cheap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tracing::debug;

use super::{ErrorCallback, EventHub, MessageCallback, Subscription, Transport};
use crate::error::{McpResult, TransportError};
use crate::messages::JsonRpcMessage;

const TRANSPORT_TYPE: &str = "in-memory";

/// In-memory transport. See the module docs for linked vs lone semantics.
pub struct InMemoryTransport {
    hub: EventHub,
    connected: AtomicBool,
    peer: Mutex<Option<Weak<InMemoryTransport>>>,
    sent: Mutex<Vec<JsonRpcMessage>>,
}

impl InMemoryTransport {
    /// Create a lone transport whose `send` delivers to local subscribers.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            hub: EventHub::new(),
            connected: AtomicBool::new(false),
            peer: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Create two linked transports. Messages sent on one are delivered to
    /// the subscribers of the other, provided the other is connected.
    pub fn create_linked_pair() -> (Arc<Self>, Arc<Self>) {
        let a = Self::new();
        let b = Self::new();
        *a.peer.lock().expect("peer lock poisoned") = Some(Arc::downgrade(&b));
        *b.peer.lock().expect("peer lock poisoned") = Some(Arc::downgrade(&a));
        (a, b)
    }

    /// Every message sent through this transport, in send order.
    pub fn sent_messages(&self) -> Vec<JsonRpcMessage> {
        self.sent.lock().expect("sent log poisoned").clone()
    }

    fn peer_handle(&self) -> Option<Arc<InMemoryTransport>> {
        self.peer
            .lock()
            .expect("peer lock poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn is_linked(&self) -> bool {
        self.peer.lock().expect("peer lock poisoned").is_some()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(&self) -> McpResult<()> {
        if self
            .connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TransportError::AlreadyConnected {
                transport_type: TRANSPORT_TYPE.to_string(),
            }
            .into());
        }
        debug!("in-memory transport connected");
        Ok(())
    }

    async fn disconnect(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.hub.clear();
        debug!("in-memory transport disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected {
                transport_type: TRANSPORT_TYPE.to_string(),
            }
            .into());
        }

        self.sent
            .lock()
            .expect("sent log poisoned")
            .push(message.clone());

        if self.is_linked() {
            match self.peer_handle() {
                Some(peer) if peer.is_connected() => peer.hub.emit_message(message).await,
                _ => {
                    // Linked peer gone or not connected: drop silently.
                    debug!("dropping message, linked peer not connected");
                }
            }
        } else {
            self.hub.emit_message(message).await;
        }
        Ok(())
    }

    fn on_message(&self, callback: MessageCallback) -> Subscription {
        self.hub.on_message(callback)
    }

    fn on_error(&self, callback: ErrorCallback) -> Subscription {
        self.hub.on_error(callback)
    }
}
