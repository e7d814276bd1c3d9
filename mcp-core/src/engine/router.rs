//! Inbound dispatch: the capability-gated method router.
//!
//! Every inbound frame lands in [`ProtocolEngine::handle_message`]. Requests
//! route through `dispatch_method`, which checks the *local* capability set
//! before touching a registry; a method whose gate is closed answers
//! Method not found (-32601). Methods the router does not recognize fall
//! through to the tool registry: a registered tool with that name has its
//! input schema validated and its handler's result wrapped as
//! `{"value": ...}`.
//!
//! Before the session is Ready, non-initialize requests answer Server not
//! initialized (-32002) and notifications are dropped without running any
//! handler.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{ProtocolEngine, Role, SessionState};
use crate::error::McpResult;
use crate::messages::{
    CancelledNotification, CompleteRequest, CompleteResponse, CreateMessageRequest,
    GetPromptRequest, GetPromptResponse, InitializeRequest, InitializeResponse, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListPromptsResponse,
    ListResourceTemplatesResponse, ListResourcesResponse, ListRootsResponse, ListToolsResponse,
    LogMessageNotification, MessageCreatedNotification, ProgressNotification, ProtocolVersion,
    ReadResourceRequest, ReadResourceResponse, RequestId, ResourceContents,
    ResourceUpdatedNotification, RootsChangedNotification, SetLevelRequest,
    SubscribeResourceRequest, UnsubscribeResourceRequest,
};
use crate::registry::prompts as prompt_ops;
use crate::validation;

impl ProtocolEngine {
    /// Entry point for every inbound frame.
    pub(crate) async fn handle_message(self: Arc<Self>, message: JsonRpcMessage) -> McpResult<()> {
        if let Err(shape) = validation::validate_message(&message) {
            if let JsonRpcMessage::Request(request) = &message {
                return self
                    .send_response(JsonRpcResponse::error(
                        request.id.clone(),
                        JsonRpcError::invalid_request(shape.to_string()),
                    ))
                    .await;
            }
            return Err(shape.into());
        }

        match message {
            JsonRpcMessage::Response(response) => {
                let outcome = match response.error {
                    Some(error) => Err(error),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                self.correlator.complete(&response.id, outcome);
                Ok(())
            }
            JsonRpcMessage::Request(request) => self.handle_request(request).await,
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<()> {
        let id = request.id.clone();
        debug!(%id, method = %request.method, "inbound request");

        if request.method == "initialize" {
            return self.handle_initialize(request).await;
        }

        if self.state() != SessionState::Ready {
            debug!(method = %request.method, "request before Ready");
            return self
                .send_response(JsonRpcResponse::error(
                    id,
                    JsonRpcError::server_not_initialized(),
                ))
                .await;
        }

        let response = match self.dispatch_method(&request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        };
        self.send_response(response).await
    }

    async fn handle_initialize(&self, request: JsonRpcRequest) -> McpResult<()> {
        let id = request.id.clone();

        if self.role == Role::Client {
            return self
                .send_response(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request("Unexpected initialize request"),
                ))
                .await;
        }

        if self.state() == SessionState::Ready {
            return self
                .send_response(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request("Server already initialized"),
                ))
                .await;
        }

        let params: InitializeRequest = match request.params_as() {
            Ok(params) => params,
            Err(e) => {
                return self
                    .send_response(JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_request(format!(
                            "Malformed initialize params: {e}"
                        )),
                    ))
                    .await;
            }
        };

        if !params.protocol_version.is_supported() {
            return self
                .send_response(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request(format!(
                        "Protocol version mismatch: expected {}, got {}",
                        ProtocolVersion::LATEST,
                        params.protocol_version
                    )),
                ))
                .await;
        }

        info!(client = %params.client_info.name, "initialize received");
        *self.peer.write().expect("peer lock poisoned") = Some(super::PeerInfo {
            info: params.client_info,
            protocol_version: params.protocol_version,
            capabilities: params.capabilities,
        });

        let result = InitializeResponse {
            protocol_version: ProtocolVersion::LATEST,
            server_info: self.config.info.clone(),
            capabilities: self.config.capabilities.clone(),
        };
        let result = match serde_json::to_value(&result) {
            Ok(result) => result,
            Err(e) => {
                return self
                    .send_response(JsonRpcResponse::error(
                        id,
                        JsonRpcError::internal_error(e.to_string()),
                    ))
                    .await;
            }
        };
        self.send_response(JsonRpcResponse::success(id, result)).await?;
        self.set_state(SessionState::Ready);
        Ok(())
    }

    /// Route one request to its handler, gated on the local capability set.
    async fn dispatch_method(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let caps = &self.config.capabilities;
        match request.method.as_str() {
            "ping" => Ok(json!({})),

            "tools/list" => {
                self.gate_local(caps.supports_tools(), &request.method)?;
                to_result(&ListToolsResponse {
                    tools: self.tools.names(),
                })
            }

            "prompts/list" => {
                self.gate_local(caps.supports_prompts(), &request.method)?;
                to_result(&ListPromptsResponse {
                    prompts: self.prompts.list(),
                })
            }

            "prompts/get" => {
                self.gate_local(caps.supports_prompts(), &request.method)?;
                let params: GetPromptRequest = parse_params(request)?;
                let entry = self.prompts.get(&params.name).ok_or_else(|| {
                    JsonRpcError::invalid_params(format!("Unknown prompt: {}", params.name))
                })?;
                prompt_ops::check_required_arguments(&entry.prompt, &params.arguments)
                    .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
                let messages = prompt_ops::render_messages(&entry.prompt, &params.arguments);
                to_result(&GetPromptResponse {
                    description: entry.prompt.description.clone(),
                    messages,
                })
            }

            "prompts/execute" => {
                self.gate_local(caps.supports_prompts(), &request.method)?;
                let params: GetPromptRequest = parse_params(request)?;
                let entry = self.prompts.get(&params.name).ok_or_else(|| {
                    JsonRpcError::invalid_params(format!("Unknown prompt: {}", params.name))
                })?;
                prompt_ops::check_required_arguments(&entry.prompt, &params.arguments)
                    .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
                let messages = match &entry.executor {
                    Some(executor) => executor(params.arguments.clone())
                        .await
                        .map_err(|e| e.to_rpc_error())?,
                    // No executor registered: fall back to the deterministic
                    // template rendering.
                    None => prompt_ops::render_messages(&entry.prompt, &params.arguments),
                };
                to_result(&GetPromptResponse {
                    description: entry.prompt.description.clone(),
                    messages,
                })
            }

            "resources/list" => {
                self.gate_local(caps.supports_resources(), &request.method)?;
                to_result(&ListResourcesResponse {
                    resources: self.resources.list(),
                })
            }

            "resources/templates/list" => {
                self.gate_local(caps.supports_resources(), &request.method)?;
                to_result(&ListResourceTemplatesResponse {
                    resource_templates: self.resources.list_templates(),
                })
            }

            "resources/read" => {
                self.gate_local(caps.supports_resources(), &request.method)?;
                let params: ReadResourceRequest = parse_params(request)?;
                let resource = self.resources.read(&params.uri).ok_or_else(|| {
                    JsonRpcError::invalid_params(format!("Unknown resource: {}", params.uri))
                })?;
                to_result(&ReadResourceResponse {
                    contents: vec![ResourceContents {
                        uri: resource.uri,
                        mime_type: resource.mime_type,
                        text: resource.text,
                    }],
                })
            }

            "resources/subscribe" => {
                self.gate_local(caps.supports_resources(), &request.method)?;
                let params: SubscribeResourceRequest = parse_params(request)?;
                let outbound = self.outbound_tx.clone();
                let handle = self
                    .resources
                    .subscribe_content(
                        &params.uri,
                        Arc::new(move |update: &ResourceUpdatedNotification| {
                            if let Ok(value) = serde_json::to_value(update) {
                                let _ = outbound.send(JsonRpcMessage::Notification(
                                    JsonRpcNotification::new(
                                        "notifications/resources/updated",
                                        value,
                                    ),
                                ));
                            }
                        }),
                    )
                    .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
                // One subscription per URI per session; a duplicate
                // subscribe replaces (and thereby detaches) the old one.
                self.content_subscriptions
                    .lock()
                    .expect("content subscriptions poisoned")
                    .insert(params.uri, handle);
                Ok(json!({}))
            }

            "resources/unsubscribe" => {
                self.gate_local(caps.supports_resources(), &request.method)?;
                let params: UnsubscribeResourceRequest = parse_params(request)?;
                self.content_subscriptions
                    .lock()
                    .expect("content subscriptions poisoned")
                    .remove(&params.uri);
                Ok(json!({}))
            }

            "roots/list" => {
                self.gate_local(caps.supports_roots(), &request.method)?;
                to_result(&ListRootsResponse {
                    roots: self.roots.list(),
                })
            }

            "sampling/createMessage" => {
                self.gate_local(caps.supports_sampling(), &request.method)?;
                let params: CreateMessageRequest = parse_params(request)?;
                let handler = {
                    self.sampling_handler
                        .read()
                        .expect("sampling handler poisoned")
                        .clone()
                };
                let response = handler
                    .create_message(params)
                    .await
                    .map_err(|e| e.to_rpc_error())?;
                if let Ok(value) = serde_json::to_value(&MessageCreatedNotification {
                    message: response.message.clone(),
                }) {
                    let _ = self.outbound_tx.send(JsonRpcMessage::Notification(
                        JsonRpcNotification::new("notifications/messageCreated", value),
                    ));
                }
                to_result(&response)
            }

            "logging/setLevel" => {
                if !caps.supports_logging() {
                    return Err(JsonRpcError::method_not_supported("Logging not supported"));
                }
                let params: SetLevelRequest = request.params_as().map_err(|e| {
                    JsonRpcError::invalid_params(format!("Invalid logging level: {e}"))
                })?;
                *self.logging_level.write().expect("logging level poisoned") =
                    Some(params.level);
                Ok(json!({}))
            }

            "completion/complete" => {
                let params: CompleteRequest = parse_params(request)?;
                let handler = {
                    self.completion_handler
                        .read()
                        .expect("completion handler poisoned")
                        .clone()
                };
                let mut completion = handler
                    .complete(params)
                    .await
                    .map_err(|e| e.to_rpc_error())?;
                let matches = completion.values.len() as u64;
                if completion.values.len() > 100 {
                    completion.values.truncate(100);
                    completion.total.get_or_insert(matches);
                    completion.has_more = Some(true);
                } else {
                    completion.total.get_or_insert(matches);
                    completion.has_more.get_or_insert(false);
                }
                to_result(&CompleteResponse { completion })
            }

            // Anything else is a tool invocation by name.
            method => match self.tools.get(method) {
                Some(entry) => {
                    let arguments = request.params.clone().unwrap_or_else(|| json!({}));
                    self.schema_validator
                        .validate(&entry.tool.input_schema, &arguments)
                        .map_err(JsonRpcError::invalid_params)?;
                    let result = (entry.handler)(arguments)
                        .await
                        .map_err(|e| e.to_rpc_error())?;
                    Ok(json!({ "value": result }))
                }
                None => Err(JsonRpcError::method_not_found(method)),
            },
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) -> McpResult<()> {
        match notification.method.as_str() {
            // Correlator traffic is processed in any state: it only ever
            // resolves our own outstanding requests.
            "notifications/cancelled" => {
                if let Ok(params) = notification.params_as::<CancelledNotification>() {
                    if let Some(id) = params.request_id.as_number() {
                        if self.correlator.cancel(id, params.reason) {
                            debug!(id, "outbound request cancelled by peer");
                        }
                    }
                }
                Ok(())
            }

            "notifications/progress" => {
                match notification.params_as::<ProgressNotification>() {
                    Ok(progress) => {
                        self.correlator.handle_progress(
                            &progress.progress_token,
                            progress.progress,
                            progress.total,
                        );
                        let handler = self.current_notification_handler();
                        handler.on_progress(progress).await;
                    }
                    Err(_) => debug!("dropping malformed progress notification"),
                }
                Ok(())
            }

            // An initialize without an id cannot complete a handshake.
            "initialize" => {
                self.send_response(JsonRpcResponse::error(
                    RequestId::Number(0),
                    JsonRpcError::invalid_request("Initialize must be a request"),
                ))
                .await
            }

            method => {
                if self.state() != SessionState::Ready {
                    debug!(method, "dropping notification before Ready");
                    return Ok(());
                }
                let handler = self.current_notification_handler();
                match method {
                    "notifications/message" => {
                        if let Ok(params) =
                            notification.params_as::<LogMessageNotification>()
                        {
                            handler.on_log_message(params).await;
                        }
                    }
                    "notifications/tools/list_changed" => {
                        handler.on_tool_list_changed().await;
                    }
                    "notifications/prompts/list_changed" => {
                        handler.on_prompt_list_changed().await;
                    }
                    "notifications/resources/list_changed" => {
                        handler.on_resource_list_changed().await;
                    }
                    "notifications/resources/updated" => {
                        if let Ok(params) =
                            notification.params_as::<ResourceUpdatedNotification>()
                        {
                            handler.on_resource_updated(params).await;
                        }
                    }
                    "notifications/rootsChanged" => {
                        if let Ok(params) =
                            notification.params_as::<RootsChangedNotification>()
                        {
                            handler.on_roots_changed(params).await;
                        }
                    }
                    "notifications/messageCreated" => {
                        if let Ok(params) =
                            notification.params_as::<MessageCreatedNotification>()
                        {
                            handler.on_message_created(params).await;
                        }
                    }
                    other => debug!(method = other, "unknown notification"),
                }
                Ok(())
            }
        }
    }

    fn current_notification_handler(&self) -> Arc<dyn super::NotificationHandler> {
        self.notification_handler
            .read()
            .expect("notification handler poisoned")
            .clone()
    }

    fn gate_local(&self, allowed: bool, method: &str) -> Result<(), JsonRpcError> {
        if allowed {
            Ok(())
        } else {
            Err(JsonRpcError::method_not_found(method))
        }
    }

    async fn send_response(&self, response: JsonRpcResponse) -> McpResult<()> {
        let transport = self.current_transport()?;
        if let Err(e) = transport.send(JsonRpcMessage::Response(response)).await {
            warn!("failed to send response: {e}");
            return Err(e);
        }
        Ok(())
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    request: &JsonRpcRequest,
) -> Result<T, JsonRpcError> {
    request
        .params_as()
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
