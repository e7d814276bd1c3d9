//! Line-delimited byte-stream transport.
//!
//! Frames are minified JSON objects separated by exactly one `\n`. The
//! transport works over any async read/write pair: an in-process duplex for
//! tests, or the stdin/stdout of a spawned child process for the classic
//! stdio deployment. A reader task splits inbound bytes on newlines and a
//! writer task drains an outbound queue, so `send` preserves FIFO order.
//!
//! Decode failures are reported per the framing rules: JSON that parses but
//! is not a valid JSON-RPC message gets an error *response* when the frame's
//! `id` is recoverable; everything else surfaces through `on_error`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{ErrorCallback, EventHub, MessageCallback, Subscription, Transport};
use crate::error::{McpError, McpResult, ProtocolError, TransportError};
use crate::messages::{JsonRpcError, JsonRpcMessage, JsonRpcResponse, RequestId};
use crate::validation;

const TRANSPORT_TYPE: &str = "byte-stream";

type DynReader = Box<dyn AsyncRead + Send + Unpin>;
type DynWriter = Box<dyn AsyncWrite + Send + Unpin>;

enum Io {
    /// A pre-established read/write pair.
    Duplex { reader: DynReader, writer: DynWriter },
    /// A command to spawn; its stdout/stdin become the stream.
    Process { command: String, args: Vec<String> },
}

/// Line-delimited JSON transport over a byte stream.
pub struct ByteStreamTransport {
    hub: EventHub,
    connected: Arc<AtomicBool>,
    io: Mutex<Option<Io>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<JsonRpcMessage>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
}

impl ByteStreamTransport {
    /// Create a transport over an existing read/write pair.
    pub fn from_duplex(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Arc<Self> {
        Self::with_io(Io::Duplex {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    /// Create a transport that spawns `command` on connect and talks to its
    /// stdin/stdout. Stderr is drained into the process log.
    pub fn process(command: impl Into<String>, args: &[String]) -> Arc<Self> {
        Self::with_io(Io::Process {
            command: command.into(),
            args: args.to_vec(),
        })
    }

    fn with_io(io: Io) -> Arc<Self> {
        Arc::new(Self {
            hub: EventHub::new(),
            connected: Arc::new(AtomicBool::new(false)),
            io: Mutex::new(Some(io)),
            outbound: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            child: Mutex::new(None),
        })
    }

    fn spawn_process(&self, command: &str, args: &[String]) -> McpResult<(DynReader, DynWriter)> {
        debug!(command, ?args, "spawning byte-stream child process");
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::ProcessError {
                reason: format!("Failed to spawn process: {e}"),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::ProcessError {
            reason: "Failed to capture stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::ProcessError {
            reason: "Failed to capture stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| TransportError::ProcessError {
            reason: "Failed to capture stderr".to_string(),
        })?;

        // Drain stderr so the child never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    warn!(target: "mcp_core::child", "{line}");
                }
            }
        });
        self.tasks.lock().expect("task list poisoned").push(stderr_task);
        *self.child.lock().expect("child lock poisoned") = Some(child);

        Ok((Box::new(stdout), Box::new(stdin)))
    }

    fn start_reader(
        &self,
        reader: DynReader,
        outbound: mpsc::UnboundedSender<JsonRpcMessage>,
    ) {
        let hub = self.hub.clone();
        let connected = self.connected.clone();
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        handle_frame(&hub, &outbound, trimmed).await;
                    }
                    Ok(None) => {
                        debug!("byte stream reached EOF");
                        if connected.swap(false, Ordering::SeqCst) {
                            hub.emit_error(
                                &TransportError::ConnectionLost {
                                    transport_type: TRANSPORT_TYPE.to_string(),
                                    reason: "stream closed".to_string(),
                                }
                                .into(),
                            );
                        }
                        break;
                    }
                    Err(e) => {
                        error!("byte stream read failed: {e}");
                        if connected.swap(false, Ordering::SeqCst) {
                            hub.emit_error(
                                &TransportError::ConnectionLost {
                                    transport_type: TRANSPORT_TYPE.to_string(),
                                    reason: e.to_string(),
                                }
                                .into(),
                            );
                        }
                        break;
                    }
                }
            }
        });
        self.tasks.lock().expect("task list poisoned").push(task);
    }

    fn start_writer(&self, mut writer: DynWriter, mut rx: mpsc::UnboundedReceiver<JsonRpcMessage>) {
        let hub = self.hub.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        hub.emit_error(&McpError::from(e));
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    hub.emit_error(
                        &TransportError::SendFailed {
                            transport_type: TRANSPORT_TYPE.to_string(),
                            reason: e.to_string(),
                        }
                        .into(),
                    );
                    break;
                }
                if let Err(e) = writer.write_all(b"\n").await {
                    hub.emit_error(
                        &TransportError::SendFailed {
                            transport_type: TRANSPORT_TYPE.to_string(),
                            reason: e.to_string(),
                        }
                        .into(),
                    );
                    break;
                }
                if let Err(e) = writer.flush().await {
                    warn!("byte stream flush failed: {e}");
                    break;
                }
            }
            debug!("byte stream writer finished");
        });
        self.tasks.lock().expect("task list poisoned").push(task);
    }
}

/// Decode one inbound line and route it: valid messages to subscribers,
/// shape errors with a recoverable id back onto the wire, the rest to the
/// error channel.
async fn handle_frame(
    hub: &EventHub,
    outbound: &mpsc::UnboundedSender<JsonRpcMessage>,
    raw: &str,
) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            hub.emit_error(
                &McpError::Protocol(ProtocolError::InvalidJsonRpc {
                    reason: format!("Parse error: {e}"),
                }),
            );
            return;
        }
    };

    match validation::parse_message(value.clone()) {
        Ok(message) => hub.emit_message(message).await,
        Err(shape_err) => {
            let id = value
                .get("id")
                .cloned()
                .and_then(|id| serde_json::from_value::<RequestId>(id).ok());
            match id {
                Some(id) => {
                    let reply = JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_request(shape_err.to_string()),
                    );
                    let _ = outbound.send(JsonRpcMessage::Response(reply));
                }
                None => hub.emit_error(&McpError::Protocol(shape_err)),
            }
        }
    }
}

#[async_trait]
impl Transport for ByteStreamTransport {
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

        let io = self.io.lock().expect("io lock poisoned").take();
        let (reader, writer) = match io {
            Some(Io::Duplex { reader, writer }) => (reader, writer),
            Some(Io::Process { command, args }) => match self.spawn_process(&command, &args) {
                Ok(pair) => pair,
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            },
            None => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(TransportError::ConnectionFailed {
                    transport_type: TRANSPORT_TYPE.to_string(),
                    reason: "stream already consumed by a previous session".to_string(),
                }
                .into());
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().expect("outbound lock poisoned") = Some(tx.clone());
        self.start_writer(writer, rx);
        self.start_reader(reader, tx);

        debug!("byte-stream transport connected");
        Ok(())
    }

    async fn disconnect(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        *self.outbound.lock().expect("outbound lock poisoned") = None;
        for task in self.tasks.lock().expect("task list poisoned").drain(..) {
            task.abort();
        }
        if let Some(mut child) = self.child.lock().expect("child lock poisoned").take() {
            let _ = child.start_kill();
        }
        self.hub.clear();
        debug!("byte-stream transport disconnected");
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
        let sender = self
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .clone()
            .ok_or_else(|| TransportError::NotConnected {
                transport_type: TRANSPORT_TYPE.to_string(),
            })?;
        sender
            .send(message)
            .map_err(|_| TransportError::SendFailed {
                transport_type: TRANSPORT_TYPE.to_string(),
                reason: "writer task stopped".to_string(),
            })?;
        Ok(())
    }

    fn on_message(&self, callback: MessageCallback) -> Subscription {
        self.hub.on_message(callback)
    }

    fn on_error(&self, callback: ErrorCallback) -> Subscription {
        self.hub.on_error(callback)
    }
}

impl Drop for ByteStreamTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.start_kill();
            }
        }
    }
}
