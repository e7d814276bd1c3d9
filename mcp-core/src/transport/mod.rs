//! MCP transport layer abstraction and implementations.
//!
//! A transport is a symmetric duplex channel: decoded messages arrive
//! through `on_message` subscribers and depart through `send`. Three
//! variants ship with the engine:
//!
//! - **in-memory**: a linked pair for same-process peers, or a lone
//!   transport that fans `send` out to its local subscribers
//! - **byte stream**: line-delimited JSON over any async read/write pair,
//!   including the stdin/stdout of a spawned child process
//! - **HTTP + SSE**: server-sent events inbound, HTTP POST outbound
//!
//! Subscribers are registered through [`Transport::on_message`] /
//! [`Transport::on_error`] and identified by the returned [`Subscription`]
//! handle; dropping the handle unregisters the callback. Delivery of one
//! inbound message awaits each subscriber in registration order before
//! moving on, and a subscriber error is forwarded to the error subscribers.

pub mod byte_stream;
pub mod http_sse;
pub mod in_memory;

pub use byte_stream::ByteStreamTransport;
pub use http_sse::HttpSseTransport;
pub use in_memory::InMemoryTransport;

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::{McpError, McpResult};
use crate::messages::JsonRpcMessage;

/// Callback invoked for every inbound message.
///
/// The returned future is awaited before the next subscriber runs; an `Err`
/// is routed to the transport's error subscribers.
pub type MessageCallback =
    Arc<dyn Fn(JsonRpcMessage) -> BoxFuture<'static, McpResult<()>> + Send + Sync>;

/// Callback invoked for transport-level errors.
pub type ErrorCallback = Arc<dyn Fn(&McpError) + Send + Sync>;

/// Core transport trait for MCP communication.
///
/// Implementations are `Arc`-shared: the engine, its dispatch tasks, and
/// user code all hold the same instance, so every method takes `&self`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the underlying connection.
    ///
    /// Fails with `AlreadyConnected` when called twice.
    async fn connect(&self) -> McpResult<()>;

    /// Tear the connection down and drop all subscribers.
    ///
    /// Safe to call multiple times.
    async fn disconnect(&self) -> McpResult<()>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Enqueue a message for delivery to the peer.
    ///
    /// Fails with `NotConnected` when the transport is down. Delivery order
    /// matches send order.
    async fn send(&self, message: JsonRpcMessage) -> McpResult<()>;

    /// Register a subscriber for inbound messages.
    fn on_message(&self, callback: MessageCallback) -> Subscription;

    /// Register a subscriber for transport errors.
    fn on_error(&self, callback: ErrorCallback) -> Subscription;
}

struct HubInner {
    next_id: u64,
    messages: Vec<(u64, MessageCallback)>,
    errors: Vec<(u64, ErrorCallback)>,
}

/// Subscriber bookkeeping shared by every transport variant.
///
/// Dispatch snapshots the subscriber list, then invokes callbacks outside
/// the lock so subscribers are free to re-subscribe or send. Clones share
/// the same subscriber sets, which lets reader tasks emit without holding
/// the transport itself.
#[derive(Clone)]
pub(crate) struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                next_id: 1,
                messages: Vec::new(),
                errors: Vec::new(),
            })),
        }
    }

    pub(crate) fn on_message(&self, callback: MessageCallback) -> Subscription {
        let mut inner = self.inner.lock().expect("event hub poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.messages.push((id, callback));
        Subscription {
            hub: Arc::downgrade(&self.inner),
            id,
            channel: Channel::Message,
        }
    }

    pub(crate) fn on_error(&self, callback: ErrorCallback) -> Subscription {
        let mut inner = self.inner.lock().expect("event hub poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.errors.push((id, callback));
        Subscription {
            hub: Arc::downgrade(&self.inner),
            id,
            channel: Channel::Error,
        }
    }

    /// Deliver one inbound message to every subscriber, sequentially, in
    /// registration order. A subscriber error goes to the error channel.
    pub(crate) async fn emit_message(&self, message: JsonRpcMessage) {
        let callbacks: Vec<MessageCallback> = {
            let inner = self.inner.lock().expect("event hub poisoned");
            inner.messages.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in callbacks {
            if let Err(err) = callback(message.clone()).await {
                self.emit_error(&err);
            }
        }
    }

    /// Deliver a transport error to every error subscriber.
    pub(crate) fn emit_error(&self, error: &McpError) {
        let callbacks: Vec<ErrorCallback> = {
            let inner = self.inner.lock().expect("event hub poisoned");
            inner.errors.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in callbacks {
            callback(error);
        }
    }

    /// Drop every subscriber. Used by `disconnect`.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock().expect("event hub poisoned");
        inner.messages.clear();
        inner.errors.clear();
    }
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Message,
    Error,
}

/// Handle identifying one registered subscriber.
///
/// Dropping the handle (or calling [`Subscription::cancel`]) unregisters
/// the callback. This replaces identity-less unsubscription by closure.
pub struct Subscription {
    hub: Weak<Mutex<HubInner>>,
    id: u64,
    channel: Channel,
}

impl Subscription {
    /// Explicitly unregister the subscriber.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            if let Ok(mut inner) = inner.lock() {
                match self.channel {
                    Channel::Message => inner.messages.retain(|(id, _)| *id != self.id),
                    Channel::Error => inner.errors.retain(|(id, _)| *id != self.id),
                }
            }
        }
    }
}
