//! The protocol engine shared by both peers.
//!
//! [`ProtocolEngine`] owns the transport binding, the request correlator,
//! the four capability registries, and the session state machine. The same
//! type runs as either peer: a [`Role::Client`] engine initiates the
//! handshake on connect, a [`Role::Server`] engine answers it. After the
//! session reaches `Ready`, inbound requests flow through the capability
//! router (see `router`), outbound calls are gated against the *peer's*
//! advertised capabilities, and out-of-band notifications (progress,
//! cancellation, registry churn, log messages) move in both directions.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_core::engine::{EngineConfig, ProtocolEngine};
//! use mcp_core::messages::{Capabilities, Implementation};
//! use mcp_core::transport::InMemoryTransport;
//!
//! # async fn example() -> mcp_core::McpResult<()> {
//! let (client_side, server_side) = InMemoryTransport::create_linked_pair();
//!
//! let server = ProtocolEngine::server(EngineConfig::new(
//!     Implementation::new("s", "1"),
//!     Capabilities::new().with_tools(true),
//! ));
//! server.connect(server_side).await?;
//!
//! let client = ProtocolEngine::client(EngineConfig::new(
//!     Implementation::new("c", "1"),
//!     Capabilities::new(),
//! ));
//! client.connect(client_side).await?;
//!
//! let tools = client.list_tools().await?;
//! println!("server exposes {tools:?}");
//! # Ok(())
//! # }
//! ```

mod correlator;
mod router;

pub use correlator::ProgressSink;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{
    McpError, McpResult, ProtocolError, TransportError, ValidationError,
};
use crate::messages::{
    CancelledNotification, Capabilities, CompleteRequest, CompleteResponse, CompletionResult,
    CreateMessageRequest, CreateMessageResponse, GetPromptRequest, GetPromptResponse,
    Implementation, InitializeRequest, InitializeResponse, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, ListPromptsResponse, ListResourceTemplatesResponse, ListResourcesResponse,
    ListRootsResponse, ListToolsResponse, LogLevel, LogMessageNotification,
    MessageCreatedNotification, ProgressNotification, ProtocolVersion, ReadResourceResponse,
    ResourceUpdatedNotification, RootsChangedNotification, SetLevelRequest,
};
use crate::registry::{
    ObserverHandle, PromptExecutor, PromptRegistry, ResourceRegistry, RootsRegistry, ToolHandler,
    ToolRegistry,
};
use crate::transport::{Subscription, Transport};
use crate::validation::{BasicSchemaValidator, SchemaValidator};
use correlator::{Completion, Correlator};

/// Which side of the session this engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiates the handshake; typically the LLM host
    Client,
    /// Answers the handshake; typically the capability provider
    Server,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport bound
    Disconnected,
    /// Transport up, handshake not started
    Connected,
    /// Handshake in flight
    Initializing,
    /// Handshake complete, full protocol available
    Ready,
    /// Session over; terminal
    Closed,
}

/// Engine configuration: identity, advertised capabilities, default timeout.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// This peer's implementation info
    pub info: Implementation,

    /// Capabilities advertised to the peer during the handshake
    pub capabilities: Capabilities,

    /// Default deadline for outbound requests
    pub request_timeout: Duration,
}

impl EngineConfig {
    /// Create a configuration with the default 30 second request timeout.
    pub fn new(info: Implementation, capabilities: Capabilities) -> Self {
        Self {
            info,
            capabilities,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Override the default request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// What the handshake learned about the peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Peer implementation details
    pub info: Implementation,

    /// Protocol version the peer negotiated
    pub protocol_version: ProtocolVersion,

    /// Capabilities the peer advertised
    pub capabilities: Capabilities,
}

/// Per-request options for [`ProtocolEngine::request`].
#[derive(Default)]
pub struct RequestOptions {
    /// Deadline override; falls back to the engine default
    pub timeout: Option<Duration>,

    /// Progress sink; when set, a progress token is allocated and written
    /// into `params._meta.progressToken`
    pub on_progress: Option<ProgressSink>,
}

impl RequestOptions {
    /// Empty options: default timeout, no progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a progress sink.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.on_progress = Some(sink);
        self
    }
}

/// Observer for inbound out-of-band notifications.
///
/// Every method has a no-op default, so embedders override only what they
/// care about.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// A well-formed progress notification arrived (token-matched sinks run
    /// independently of this hook).
    async fn on_progress(&self, notification: ProgressNotification) {
        debug!(?notification, "progress notification");
    }

    /// A wire-level log message arrived.
    async fn on_log_message(&self, notification: LogMessageNotification) {
        debug!(?notification, "log message notification");
    }

    /// The peer's tool listing changed.
    async fn on_tool_list_changed(&self) {}

    /// The peer's prompt listing changed.
    async fn on_prompt_list_changed(&self) {}

    /// The peer's resource listing changed.
    async fn on_resource_list_changed(&self) {}

    /// A subscribed resource's content changed.
    async fn on_resource_updated(&self, notification: ResourceUpdatedNotification) {
        debug!(uri = %notification.uri, "resource updated notification");
    }

    /// The peer's root set changed.
    async fn on_roots_changed(&self, notification: RootsChangedNotification) {
        debug!(roots = notification.roots.len(), "roots changed notification");
    }

    /// The peer created a sampling message.
    async fn on_message_created(&self, _notification: MessageCreatedNotification) {}
}

/// Default handler: logs and otherwise ignores everything.
#[derive(Debug, Default)]
pub struct DefaultNotificationHandler;

#[async_trait]
impl NotificationHandler for DefaultNotificationHandler {}

/// Answers `sampling/createMessage`. The real LLM lives behind this trait.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Produce a message for the given sampling request.
    async fn create_message(&self, request: CreateMessageRequest)
        -> McpResult<CreateMessageResponse>;
}

/// Sampling handler that returns a canned assistant message.
#[derive(Debug, Default)]
pub struct PlaceholderSamplingHandler;

#[async_trait]
impl SamplingHandler for PlaceholderSamplingHandler {
    async fn create_message(
        &self,
        _request: CreateMessageRequest,
    ) -> McpResult<CreateMessageResponse> {
        Ok(CreateMessageResponse {
            message: crate::messages::SamplingMessage::assistant(
                "Placeholder response: no sampling backend configured",
            ),
        })
    }
}

/// Answers `completion/complete`.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// Suggest values for the argument being completed.
    async fn complete(&self, request: CompleteRequest) -> McpResult<CompletionResult>;
}

/// Completion handler with no suggestions.
#[derive(Debug, Default)]
pub struct EmptyCompletionHandler;

#[async_trait]
impl CompletionHandler for EmptyCompletionHandler {
    async fn complete(&self, _request: CompleteRequest) -> McpResult<CompletionResult> {
        Ok(CompletionResult {
            values: Vec::new(),
            total: Some(0),
            has_more: Some(false),
        })
    }
}

/// The symmetric MCP protocol engine. See the module docs for an overview.
pub struct ProtocolEngine {
    role: Role,
    config: EngineConfig,
    weak_self: Weak<ProtocolEngine>,
    state: RwLock<SessionState>,
    peer: RwLock<Option<PeerInfo>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    correlator: Correlator,
    next_id: AtomicI64,
    tools: ToolRegistry,
    prompts: PromptRegistry,
    resources: ResourceRegistry,
    roots: RootsRegistry,
    logging_level: RwLock<Option<LogLevel>>,
    schema_validator: Arc<dyn SchemaValidator>,
    sampling_handler: RwLock<Arc<dyn SamplingHandler>>,
    completion_handler: RwLock<Arc<dyn CompletionHandler>>,
    notification_handler: RwLock<Arc<dyn NotificationHandler>>,
    outbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<JsonRpcMessage>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    observer_handles: Mutex<Vec<ObserverHandle>>,
    content_subscriptions: Mutex<HashMap<String, ObserverHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ProtocolEngine {
    /// Create a client-role engine.
    pub fn client(config: EngineConfig) -> Arc<Self> {
        Self::with_role(Role::Client, config)
    }

    /// Create a server-role engine.
    pub fn server(config: EngineConfig) -> Arc<Self> {
        Self::with_role(Role::Server, config)
    }

    /// Start a builder for non-default handlers or validators.
    pub fn builder(role: Role) -> ProtocolEngineBuilder {
        ProtocolEngineBuilder::new(role)
    }

    fn with_role(role: Role, config: EngineConfig) -> Arc<Self> {
        ProtocolEngineBuilder::new(role).config(config).build()
    }

    /// Which side of the session this engine plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.read().expect("state lock poisoned")
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.write().expect("state lock poisoned");
        debug!(from = ?*state, to = ?next, "session state transition");
        *state = next;
    }

    /// What the handshake learned about the peer, once Ready.
    pub fn peer_info(&self) -> Option<PeerInfo> {
        self.peer.read().expect("peer lock poisoned").clone()
    }

    /// Number of outstanding outbound requests.
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Borrowed access to the tool registry.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Borrowed access to the prompt registry.
    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    /// Borrowed access to the resource registry.
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Borrowed access to the roots registry.
    pub fn roots(&self) -> &RootsRegistry {
        &self.roots
    }

    /// Swap the sampling handler.
    pub fn set_sampling_handler(&self, handler: Arc<dyn SamplingHandler>) {
        *self
            .sampling_handler
            .write()
            .expect("sampling handler poisoned") = handler;
    }

    /// Swap the completion handler.
    pub fn set_completion_handler(&self, handler: Arc<dyn CompletionHandler>) {
        *self
            .completion_handler
            .write()
            .expect("completion handler poisoned") = handler;
    }

    /// Swap the notification handler.
    pub fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self
            .notification_handler
            .write()
            .expect("notification handler poisoned") = handler;
    }

    // ---- lifecycle ----------------------------------------------------

    /// Bind a transport and run this role's side of the handshake.
    ///
    /// Client engines send `initialize` and wait for the reply; server
    /// engines return immediately and complete the handshake when the
    /// client's `initialize` arrives. Calling `connect` on an engine that
    /// is past `Disconnected` fails with `AlreadyInitialized`.
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> McpResult<()> {
        if self.state() != SessionState::Disconnected {
            return Err(ProtocolError::AlreadyInitialized.into());
        }

        transport.connect().await?;
        *self.transport.write().expect("transport lock poisoned") = Some(transport.clone());

        self.bind_transport(&transport);
        self.start_outbound_pump(&transport);
        self.wire_registry_observers();
        self.set_state(SessionState::Connected);

        match self.role {
            Role::Client => self.run_client_handshake().await,
            Role::Server => {
                info!(name = %self.config.info.name, "server engine awaiting initialize");
                Ok(())
            }
        }
    }

    /// Close the session and tear down the transport binding.
    pub async fn disconnect(&self) -> McpResult<()> {
        self.set_state(SessionState::Closed);
        self.subscriptions
            .lock()
            .expect("subscriptions poisoned")
            .clear();
        self.content_subscriptions
            .lock()
            .expect("content subscriptions poisoned")
            .clear();
        for task in self.tasks.lock().expect("tasks poisoned").drain(..) {
            task.abort();
        }
        let transport = self
            .transport
            .write()
            .expect("transport lock poisoned")
            .take();
        if let Some(transport) = transport {
            transport.disconnect().await?;
        }
        info!("engine disconnected");
        Ok(())
    }

    fn bind_transport(&self, transport: &Arc<dyn Transport>) {
        let weak = self.weak_self.clone();
        let message_sub = transport.on_message(Arc::new(move |message| {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(engine) => engine.handle_message(message).await,
                    None => Ok(()),
                }
            })
        }));

        let weak = self.weak_self.clone();
        let error_sub = transport.on_error(Arc::new(move |error| {
            if let Some(engine) = weak.upgrade() {
                if matches!(
                    error,
                    McpError::Transport(TransportError::ConnectionLost { .. })
                ) {
                    warn!("transport connection lost, closing session");
                    engine.set_state(SessionState::Closed);
                }
            }
        }));

        let mut subscriptions = self.subscriptions.lock().expect("subscriptions poisoned");
        subscriptions.push(message_sub);
        subscriptions.push(error_sub);
    }

    /// Drain the outbound notification queue into the transport.
    ///
    /// Registry observers run inside mutation critical sections and only
    /// enqueue; this task does the actual sends, preserving enqueue order.
    fn start_outbound_pump(&self, transport: &Arc<dyn Transport>) {
        let rx = self
            .outbound_rx
            .lock()
            .expect("outbound rx poisoned")
            .take();
        let Some(mut rx) = rx else {
            return;
        };
        let transport = transport.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = transport.send(message).await {
                    warn!("outbound notification dropped: {e}");
                }
            }
        });
        self.tasks.lock().expect("tasks poisoned").push(task);
    }

    /// Hook registry churn up to list-changed notifications.
    ///
    /// Each observer enqueues only when the matching `listChanged`
    /// capability was advertised and the session is Ready.
    fn wire_registry_observers(&self) {
        let mut handles = self
            .observer_handles
            .lock()
            .expect("observer handles poisoned");
        if !handles.is_empty() {
            return;
        }

        let weak = self.weak_self.clone();
        handles.push(self.tools.on_list_changed(Arc::new(move |_| {
            if let Some(engine) = weak.upgrade() {
                if engine.state() == SessionState::Ready
                    && engine.config.capabilities.tools_list_changed()
                {
                    let _ = engine.outbound_tx.send(JsonRpcMessage::Notification(
                        JsonRpcNotification::without_params("notifications/tools/list_changed"),
                    ));
                }
            }
        })));

        let weak = self.weak_self.clone();
        handles.push(self.prompts.on_list_changed(Arc::new(move |_| {
            if let Some(engine) = weak.upgrade() {
                if engine.state() == SessionState::Ready
                    && engine.config.capabilities.prompts_list_changed()
                {
                    let _ = engine.outbound_tx.send(JsonRpcMessage::Notification(
                        JsonRpcNotification::without_params("notifications/prompts/list_changed"),
                    ));
                }
            }
        })));

        let weak = self.weak_self.clone();
        handles.push(self.resources.on_list_changed(Arc::new(move |_| {
            if let Some(engine) = weak.upgrade() {
                if engine.state() == SessionState::Ready
                    && engine.config.capabilities.resources_list_changed()
                {
                    let _ = engine.outbound_tx.send(JsonRpcMessage::Notification(
                        JsonRpcNotification::without_params(
                            "notifications/resources/list_changed",
                        ),
                    ));
                }
            }
        })));

        let weak = self.weak_self.clone();
        handles.push(self.roots.on_changed(Arc::new(move |roots| {
            if let Some(engine) = weak.upgrade() {
                if engine.state() == SessionState::Ready
                    && engine.config.capabilities.roots_list_changed()
                {
                    let _ = engine.outbound_tx.send(JsonRpcMessage::Notification(
                        JsonRpcNotification::new(
                            "notifications/rootsChanged",
                            json!({ "roots": roots }),
                        ),
                    ));
                }
            }
        })));
    }

    async fn run_client_handshake(&self) -> McpResult<()> {
        self.set_state(SessionState::Initializing);
        info!(name = %self.config.info.name, "starting initialize handshake");

        let params = InitializeRequest {
            protocol_version: ProtocolVersion::LATEST,
            client_info: self.config.info.clone(),
            capabilities: self.config.capabilities.clone(),
        };
        let params = serde_json::to_value(&params)?;

        let result = self
            .send_request_raw("initialize", Some(params), RequestOptions::new())
            .await;
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                self.set_state(SessionState::Closed);
                return Err(ProtocolError::InitializationFailed {
                    reason: e.to_string(),
                }
                .into());
            }
        };

        let response: InitializeResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(e) => {
                self.set_state(SessionState::Closed);
                return Err(ProtocolError::InvalidResponse {
                    reason: format!("Malformed initialize result: {e}"),
                }
                .into());
            }
        };

        if !response.protocol_version.is_supported() {
            self.set_state(SessionState::Closed);
            return Err(ProtocolError::VersionMismatch {
                expected: ProtocolVersion::LATEST.to_string(),
                actual: response.protocol_version.to_string(),
            }
            .into());
        }

        info!(server = %response.server_info.name, "handshake complete");
        *self.peer.write().expect("peer lock poisoned") = Some(PeerInfo {
            info: response.server_info,
            protocol_version: response.protocol_version,
            capabilities: response.capabilities,
        });
        self.set_state(SessionState::Ready);
        Ok(())
    }

    // ---- outbound requests --------------------------------------------

    /// Send a request and wait for its result.
    ///
    /// Requires the session to be Ready. Exactly one of response, timeout,
    /// local cancel, or peer cancel resolves the returned future.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        self.ensure_ready()?;
        self.send_request_raw(method, params, options).await
    }

    /// Send a notification to the peer.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.ensure_ready()?;
        let notification = match params {
            Some(params) => JsonRpcNotification::new(method, params),
            None => JsonRpcNotification::without_params(method),
        };
        self.current_transport()?
            .send(JsonRpcMessage::Notification(notification))
            .await
    }

    /// Cancel an outstanding outbound request.
    ///
    /// Resolves the awaiter with `RequestCancelled` and emits a best-effort
    /// `notifications/cancelled` so the peer can stop working. Returns
    /// whether the id was still pending.
    pub fn cancel_request(&self, id: i64, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if self.correlator.cancel(id, Some(reason.clone())) {
            self.enqueue_cancelled(id, Some(reason));
            true
        } else {
            false
        }
    }

    async fn send_request_raw(
        &self,
        method: &str,
        mut params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        let transport = self.current_transport()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let progress = options.on_progress.map(|sink| {
            let token = Uuid::new_v4().to_string();
            (token, sink)
        });
        if let Some((token, _)) = &progress {
            let params = params.get_or_insert_with(|| json!({}));
            if let Some(object) = params.as_object_mut() {
                let meta = object.entry("_meta").or_insert_with(|| json!({}));
                if let Some(meta) = meta.as_object_mut() {
                    meta.insert("progressToken".to_string(), json!(token));
                }
            }
        }

        let mut rx = self.correlator.register(id, progress);

        let request = match params {
            Some(params) => JsonRpcRequest::new(id, method, params),
            None => JsonRpcRequest::without_params(id, method),
        };
        debug!(id, method, "sending request");
        if let Err(e) = transport.send(JsonRpcMessage::Request(request)).await {
            self.correlator.remove(id);
            return Err(e);
        }

        let timeout = options.timeout.unwrap_or(self.config.request_timeout);
        tokio::select! {
            outcome = &mut rx => match outcome {
                Ok(Completion::Result(value)) => Ok(value),
                Ok(Completion::RpcError(error)) => Err(error.into()),
                Ok(Completion::Cancelled(reason)) => Err(ProtocolError::RequestCancelled {
                    reason: reason.unwrap_or_default(),
                }
                .into()),
                Err(_) => Err(McpError::internal("completion channel closed")),
            },
            _ = tokio::time::sleep(timeout) => {
                if self.correlator.remove(id) {
                    // Best-effort hint that we stopped waiting.
                    self.enqueue_cancelled(id, Some("timeout".to_string()));
                    Err(ProtocolError::RequestTimeout {
                        millis: timeout.as_millis() as u64,
                    }
                    .into())
                } else {
                    // A resolution raced the deadline; deliver it.
                    match rx.try_recv() {
                        Ok(Completion::Result(value)) => Ok(value),
                        Ok(Completion::RpcError(error)) => Err(error.into()),
                        Ok(Completion::Cancelled(reason)) => {
                            Err(ProtocolError::RequestCancelled {
                                reason: reason.unwrap_or_default(),
                            }
                            .into())
                        }
                        Err(_) => Err(ProtocolError::RequestTimeout {
                            millis: timeout.as_millis() as u64,
                        }
                        .into()),
                    }
                }
            }
        }
    }

    fn enqueue_cancelled(&self, id: i64, reason: Option<String>) {
        let cancelled = CancelledNotification {
            request_id: id.into(),
            reason,
        };
        if let Ok(params) = serde_json::to_value(&cancelled) {
            let _ = self.outbound_tx.send(JsonRpcMessage::Notification(
                JsonRpcNotification::new("notifications/cancelled", params),
            ));
        }
    }

    fn current_transport(&self) -> McpResult<Arc<dyn Transport>> {
        self.transport
            .read()
            .expect("transport lock poisoned")
            .clone()
            .ok_or_else(|| {
                ProtocolError::NotInitialized {
                    reason: "no transport bound".to_string(),
                }
                .into()
            })
    }

    fn ensure_ready(&self) -> McpResult<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            state => Err(ProtocolError::NotInitialized {
                reason: format!("session is {state:?}"),
            }
            .into()),
        }
    }

    fn peer_capabilities(&self) -> McpResult<Capabilities> {
        self.peer
            .read()
            .expect("peer lock poisoned")
            .as_ref()
            .map(|peer| peer.capabilities.clone())
            .ok_or_else(|| {
                ProtocolError::NotInitialized {
                    reason: "handshake not complete".to_string(),
                }
                .into()
            })
    }

    fn gate_peer(&self, allowed: bool, reason: &str) -> McpResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedCapability {
                reason: reason.to_string(),
            }
            .into())
        }
    }

    // ---- typed client-side operations ---------------------------------

    /// `ping`: round-trip liveness check.
    pub async fn ping(&self) -> McpResult<()> {
        self.request("ping", None, RequestOptions::new()).await?;
        Ok(())
    }

    /// `tools/list`: names of the peer's tools.
    pub async fn list_tools(&self) -> McpResult<Vec<String>> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(caps.supports_tools(), "Server does not support tool listing")?;
        let value = self.request("tools/list", None, RequestOptions::new()).await?;
        let response: ListToolsResponse = serde_json::from_value(value)?;
        Ok(response.tools)
    }

    /// Invoke the peer's tool `name`, returning the raw result value.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        options: RequestOptions,
    ) -> McpResult<Value> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(caps.supports_tools(), "Server does not support tools")?;
        self.request(name, Some(arguments), options).await
    }

    /// `prompts/list`.
    pub async fn list_prompts(&self) -> McpResult<ListPromptsResponse> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(caps.supports_prompts(), "Server does not support prompts")?;
        let value = self
            .request("prompts/list", None, RequestOptions::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `prompts/get`: deterministic rendering of a prompt.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> McpResult<GetPromptResponse> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(caps.supports_prompts(), "Server does not support prompts")?;
        let params = serde_json::to_value(&GetPromptRequest {
            name: name.to_string(),
            arguments,
        })?;
        let value = self
            .request("prompts/get", Some(params), RequestOptions::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `prompts/execute`: run a prompt's executor.
    pub async fn execute_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> McpResult<GetPromptResponse> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(caps.supports_prompts(), "Server does not support prompts")?;
        let params = serde_json::to_value(&GetPromptRequest {
            name: name.to_string(),
            arguments,
        })?;
        let value = self
            .request("prompts/execute", Some(params), RequestOptions::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `resources/list`.
    pub async fn list_resources(&self) -> McpResult<ListResourcesResponse> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(
            caps.supports_resources(),
            "Server does not support resources",
        )?;
        let value = self
            .request("resources/list", None, RequestOptions::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `resources/templates/list`.
    pub async fn list_resource_templates(&self) -> McpResult<ListResourceTemplatesResponse> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(
            caps.supports_resources(),
            "Server does not support resources",
        )?;
        let value = self
            .request("resources/templates/list", None, RequestOptions::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `resources/read`.
    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResponse> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(
            caps.supports_resources(),
            "Server does not support resources",
        )?;
        let value = self
            .request(
                "resources/read",
                Some(json!({ "uri": uri })),
                RequestOptions::new(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `resources/subscribe`: watch one URI for content changes.
    pub async fn subscribe_resource(&self, uri: &str) -> McpResult<()> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(
            caps.supports_resources() && caps.resources_subscribe(),
            "Server does not support resource subscriptions",
        )?;
        self.request(
            "resources/subscribe",
            Some(json!({ "uri": uri })),
            RequestOptions::new(),
        )
        .await?;
        Ok(())
    }

    /// `resources/unsubscribe`.
    pub async fn unsubscribe_resource(&self, uri: &str) -> McpResult<()> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(
            caps.supports_resources() && caps.resources_subscribe(),
            "Server does not support resource subscriptions",
        )?;
        self.request(
            "resources/unsubscribe",
            Some(json!({ "uri": uri })),
            RequestOptions::new(),
        )
        .await?;
        Ok(())
    }

    /// `roots/list`: ask the peer for its workspace roots.
    pub async fn list_roots(&self) -> McpResult<Vec<String>> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(caps.supports_roots(), "Peer does not support roots")?;
        let value = self
            .request("roots/list", None, RequestOptions::new())
            .await?;
        let response: ListRootsResponse = serde_json::from_value(value)?;
        Ok(response.roots)
    }

    /// `sampling/createMessage`: ask the peer's LLM host for a message.
    pub async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> McpResult<CreateMessageResponse> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(caps.supports_sampling(), "Peer does not support sampling")?;
        let params = serde_json::to_value(&request)?;
        let value = self
            .request("sampling/createMessage", Some(params), RequestOptions::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `logging/setLevel`: set the peer's log threshold.
    pub async fn set_logging_level(&self, level: LogLevel) -> McpResult<()> {
        let caps = self.peer_capabilities()?;
        self.gate_peer(caps.supports_logging(), "Server does not support logging")?;
        let params = serde_json::to_value(&SetLevelRequest { level })?;
        self.request("logging/setLevel", Some(params), RequestOptions::new())
            .await?;
        Ok(())
    }

    /// `completion/complete`: argument completion suggestions.
    pub async fn complete(&self, request: CompleteRequest) -> McpResult<CompleteResponse> {
        let params = serde_json::to_value(&request)?;
        let value = self
            .request("completion/complete", Some(params), RequestOptions::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    // ---- registration convenience -------------------------------------

    /// Register a tool on this engine's registry.
    pub fn register_tool(&self, tool: crate::messages::Tool, handler: ToolHandler) -> McpResult<()> {
        self.tools.register(tool, handler)
    }

    /// Unregister a tool.
    pub fn unregister_tool(&self, name: &str) -> bool {
        self.tools.unregister(name)
    }

    /// Register a prompt with an optional executor.
    pub fn register_prompt(
        &self,
        prompt: crate::messages::Prompt,
        executor: Option<PromptExecutor>,
    ) {
        self.prompts.register(prompt, executor);
    }

    /// Register a resource (re-registering a URI mutates its content).
    pub fn register_resource(&self, resource: crate::messages::Resource) {
        self.resources.register(resource);
    }

    /// Register a resource template.
    pub fn register_resource_template(&self, template: crate::messages::ResourceTemplate) {
        self.resources.register_template(template);
    }

    /// Add a workspace root.
    pub fn add_root(&self, uri: impl Into<String>) -> bool {
        self.roots.add(uri)
    }

    /// Remove a workspace root.
    pub fn remove_root(&self, uri: &str) -> bool {
        self.roots.remove(uri)
    }

    // ---- outbound out-of-band notifications ---------------------------

    /// Emit a wire-level log message through the session's logging filter.
    ///
    /// The notification goes out only when the `logging` capability was
    /// advertised, the session is Ready, a threshold has been set via
    /// `logging/setLevel`, and `level` passes it. Returns whether the
    /// message was emitted.
    pub fn send_log_message(
        &self,
        level: LogLevel,
        data: Value,
        logger: Option<String>,
    ) -> McpResult<bool> {
        if !self.config.capabilities.supports_logging() {
            return Ok(false);
        }
        if self.state() != SessionState::Ready {
            return Ok(false);
        }
        let threshold = *self.logging_level.read().expect("logging level poisoned");
        let Some(threshold) = threshold else {
            return Ok(false);
        };
        if level < threshold {
            return Ok(false);
        }

        let params = serde_json::to_value(&LogMessageNotification {
            level,
            logger,
            data,
        })?;
        let _ = self.outbound_tx.send(JsonRpcMessage::Notification(
            JsonRpcNotification::new("notifications/message", params),
        ));
        Ok(true)
    }

    /// Emit a progress notification for a peer-supplied token.
    pub fn send_progress(
        &self,
        token: impl Into<crate::messages::ProgressToken>,
        progress: f64,
        total: Option<f64>,
    ) -> McpResult<()> {
        let params = serde_json::to_value(&ProgressNotification {
            progress_token: token.into(),
            progress,
            total,
        })?;
        let _ = self.outbound_tx.send(JsonRpcMessage::Notification(
            JsonRpcNotification::new("notifications/progress", params),
        ));
        Ok(())
    }

    /// The session's current logging threshold, if one was set.
    pub fn logging_level(&self) -> Option<LogLevel> {
        *self.logging_level.read().expect("logging level poisoned")
    }
}

/// Builder for engines with non-default handlers or validators.
pub struct ProtocolEngineBuilder {
    role: Role,
    config: Option<EngineConfig>,
    schema_validator: Arc<dyn SchemaValidator>,
    sampling_handler: Arc<dyn SamplingHandler>,
    completion_handler: Arc<dyn CompletionHandler>,
    notification_handler: Arc<dyn NotificationHandler>,
}

impl ProtocolEngineBuilder {
    /// Start a builder for the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            config: None,
            schema_validator: Arc::new(BasicSchemaValidator),
            sampling_handler: Arc::new(PlaceholderSamplingHandler),
            completion_handler: Arc::new(EmptyCompletionHandler),
            notification_handler: Arc::new(DefaultNotificationHandler),
        }
    }

    /// Set the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the schema validator.
    pub fn schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.schema_validator = validator;
        self
    }

    /// Replace the sampling handler.
    pub fn sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling_handler = handler;
        self
    }

    /// Replace the completion handler.
    pub fn completion_handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.completion_handler = handler;
        self
    }

    /// Replace the notification handler.
    pub fn notification_handler(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.notification_handler = handler;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Arc<ProtocolEngine> {
        let config = self.config.unwrap_or_else(|| {
            EngineConfig::new(
                Implementation::new("mcp-core", crate::VERSION),
                Capabilities::default(),
            )
        });
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Arc::new_cyclic(|weak| ProtocolEngine {
            role: self.role,
            config,
            weak_self: weak.clone(),
            state: RwLock::new(SessionState::Disconnected),
            peer: RwLock::new(None),
            transport: RwLock::new(None),
            correlator: Correlator::new(),
            next_id: AtomicI64::new(1),
            tools: ToolRegistry::new(),
            prompts: PromptRegistry::new(),
            resources: ResourceRegistry::new(),
            roots: RootsRegistry::new(),
            logging_level: RwLock::new(None),
            schema_validator: self.schema_validator,
            sampling_handler: RwLock::new(self.sampling_handler),
            completion_handler: RwLock::new(self.completion_handler),
            notification_handler: RwLock::new(self.notification_handler),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            subscriptions: Mutex::new(Vec::new()),
            observer_handles: Mutex::new(Vec::new()),
            content_subscriptions: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }
}
