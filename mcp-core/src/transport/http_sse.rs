//! HTTP + Server-Sent Events transport.
//!
//! The two halves are strictly unidirectional: the server pushes messages
//! to the client as SSE events (each `data:` field is one JSON object), and
//! the client sends messages to the server as HTTP POST bodies (serialized
//! JSON plus a trailing newline). A non-2xx status on the POST surfaces as
//! a transport error carrying the status code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::{ErrorCallback, EventHub, MessageCallback, Subscription, Transport};
use crate::error::{McpError, McpResult, ProtocolError, TransportError};
use crate::messages::JsonRpcMessage;
use crate::validation;

const TRANSPORT_TYPE: &str = "http-sse";

/// SSE-inbound, POST-outbound transport (the client side of the pair).
pub struct HttpSseTransport {
    hub: EventHub,
    connected: Arc<AtomicBool>,
    client: Client,
    events_url: Url,
    post_url: Url,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpSseTransport {
    /// Create a transport reading events from `events_url` and posting
    /// outbound messages to `post_url`.
    pub fn new(events_url: Url, post_url: Url) -> McpResult<Arc<Self>> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::InvalidConfig {
                transport_type: TRANSPORT_TYPE.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Arc::new(Self {
            hub: EventHub::new(),
            connected: Arc::new(AtomicBool::new(false)),
            client,
            events_url,
            post_url,
            tasks: Mutex::new(Vec::new()),
        }))
    }
}

#[async_trait]
impl Transport for HttpSseTransport {
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

        debug!(url = %self.events_url, "opening SSE event stream");
        let response = self
            .client
            .get(self.events_url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| {
                self.connected.store(false, Ordering::SeqCst);
                TransportError::ConnectionFailed {
                    transport_type: TRANSPORT_TYPE.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::HttpError {
                status_code: status.as_u16(),
                reason: format!("event stream request rejected: {status}"),
            }
            .into());
        }

        let hub = self.hub.clone();
        let task = tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<serde_json::Value>(data) {
                            Ok(value) => match validation::parse_message(value) {
                                Ok(message) => hub.emit_message(message).await,
                                Err(shape_err) => {
                                    hub.emit_error(&McpError::Protocol(shape_err))
                                }
                            },
                            Err(e) => hub.emit_error(&McpError::Protocol(
                                ProtocolError::InvalidJsonRpc {
                                    reason: format!("Parse error: {e}"),
                                },
                            )),
                        }
                    }
                    Err(e) => {
                        warn!("SSE stream error: {e}");
                        hub.emit_error(
                            &TransportError::SseError {
                                reason: e.to_string(),
                            }
                            .into(),
                        );
                        break;
                    }
                }
            }
            // The POST half stays usable after the event stream ends; only
            // an explicit disconnect tears the transport down.
            debug!("SSE event stream ended");
        });
        self.tasks.lock().expect("task list poisoned").push(task);

        debug!("http-sse transport connected");
        Ok(())
    }

    async fn disconnect(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().expect("task list poisoned").drain(..) {
            task.abort();
        }
        self.hub.clear();
        debug!("http-sse transport disconnected");
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

        let mut body = serde_json::to_string(&message)?;
        body.push('\n');

        let response = self
            .client
            .post(self.post_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed {
                transport_type: TRANSPORT_TYPE.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpError {
                status_code: status.as_u16(),
                reason: format!("POST rejected: {status}"),
            }
            .into());
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
