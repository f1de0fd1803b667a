//! MCP server implementation.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::*;
use crate::mcp::transport::{Message, Transport};
use crate::metrics::Metrics;
use crate::{SERVER_NAME, VERSION};

/// Builds the tool registry; called again on demand until it succeeds.
pub type ToolInstaller = Arc<dyn Fn() -> Result<McpHandler> + Send + Sync>;

/// MCP server.
///
/// Tools may be installed late: a server whose installer failed answers
/// `tools/list` with nothing and retries installation on each tool request.
pub struct McpServer {
    handler: RwLock<Option<Arc<McpHandler>>>,
    installer: Option<ToolInstaller>,
    /// Channel for server-initiated messages, set while connected.
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    metrics: Arc<Metrics>,
    name: String,
    version: String,
}

impl McpServer {
    /// Create a new MCP server with installed tools.
    pub fn new(handler: McpHandler) -> Self {
        Self::build(Some(Arc::new(handler)), None)
    }

    /// Create a server whose tools come from `installer`.
    ///
    /// Nothing is installed until [`install_tools`](Self::install_tools) or
    /// the first tool request.
    pub fn with_installer(installer: ToolInstaller) -> Self {
        Self::build(None, Some(installer))
    }

    fn build(handler: Option<Arc<McpHandler>>, installer: Option<ToolInstaller>) -> Self {
        Self {
            handler: RwLock::new(handler),
            installer,
            outbound: Mutex::new(None),
            metrics: Metrics::new(),
            name: SERVER_NAME.to_string(),
            version: VERSION.to_string(),
        }
    }

    /// Share a metrics collector with the server.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether tools are installed.
    pub async fn has_tools(&self) -> bool {
        self.handler.read().await.is_some()
    }

    /// Install tools now. No-op when already installed.
    pub async fn install_tools(&self) -> Result<()> {
        let mut slot = self.handler.write().await;
        if slot.is_some() {
            return Ok(());
        }
        let installer = self.installer.as_ref().ok_or(Error::NotInitialized)?;
        *slot = Some(Arc::new(installer()?));
        Ok(())
    }

    /// Installed tools, retrying installation when missing.
    async fn tools(&self) -> Option<Arc<McpHandler>> {
        if let Some(handler) = self.handler.read().await.clone() {
            return Some(handler);
        }
        let installer = self.installer.as_ref()?;

        let mut slot = self.handler.write().await;
        if let Some(handler) = slot.clone() {
            return Some(handler);
        }
        match installer() {
            Ok(handler) => {
                let handler = Arc::new(handler);
                *slot = Some(handler.clone());
                drop(slot);
                info!(tools = handler.tool_count(), "Tools installed on retry");
                self.notify(JsonRpcNotification::new(TOOLS_LIST_CHANGED)).await;
                Some(handler)
            }
            Err(e) => {
                warn!("Tool installation failed: {}", e);
                None
            }
        }
    }

    /// Attach the channel server-initiated messages are written to.
    pub async fn connect(&self, sender: mpsc::Sender<Message>) {
        *self.outbound.lock().await = Some(sender);
    }

    /// Detach the outbound channel.
    pub async fn disconnect(&self) {
        self.outbound.lock().await.take();
    }

    /// Send a notification to the connected transport, if any.
    pub async fn notify(&self, notification: JsonRpcNotification) {
        let sender = self.outbound.lock().await.clone();
        match sender {
            Some(tx) => {
                debug!("Sending notification: {}", notification.method);
                if tx.send(Message::Notification(notification)).await.is_err() {
                    warn!("Transport closed, dropping notification");
                }
            }
            None => debug!("No transport connected, dropping {}", notification.method),
        }
    }

    /// Run the server with the given transport.
    pub async fn run<T: Transport>(&self, mut transport: T) -> Result<()> {
        info!("Starting MCP server: {} v{}", self.name, self.version);

        let (mut incoming, outgoing) = transport.start().await?;
        self.connect(outgoing.clone()).await;

        while let Some(msg) = incoming.recv().await {
            if let Some(response) = self.handle_message(msg).await {
                if outgoing.send(Message::Response(response)).await.is_err() {
                    error!("Failed to send response");
                    break;
                }
            }
        }

        self.disconnect().await;
        transport.stop().await?;
        info!("MCP server stopped");
        Ok(())
    }

    /// Handle one inbound message, returning the response for requests.
    pub async fn handle_message(&self, msg: Message) -> Option<JsonRpcResponse> {
        match msg {
            Message::Request(req) => Some(self.handle_request(req).await),
            Message::Notification(notif) => {
                self.handle_notification(notif).await;
                None
            }
            Message::Response(_) => {
                warn!("Received unexpected response");
                None
            }
        }
    }

    /// Handle a JSON-RPC request.
    pub async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling request: {} (id: {:?})", req.method, req.id);

        let result = match req.method.as_str() {
            "initialize" => self
                .handle_initialize()
                .map_err(|e| JsonRpcError::from_error(&e, "initialize")),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self
                .handle_list_tools()
                .await
                .map_err(|e| JsonRpcError::from_error(&e, "tools/list")),
            "tools/call" => self.handle_call_tool(req.params).await,
            other => Err(JsonRpcError::from_error(
                &Error::MethodNotFound(other.to_string()),
                other,
            )),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(req.id, value),
            Err(error) => JsonRpcResponse::failure(req.id, error),
        }
    }

    /// Handle a notification.
    async fn handle_notification(&self, notif: JsonRpcNotification) {
        debug!("Handling notification: {}", notif.method);

        match notif.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                let request_id = notif
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .cloned()
                    .unwrap_or(Value::Null);
                info!("Client cancelled request: {}", request_id);
            }
            _ => {
                debug!("Unknown notification: {}", notif.method);
            }
        }
    }

    /// Handle initialize request.
    fn handle_initialize(&self) -> Result<Value> {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: true }),
            },
            server_info: ServerInfo {
                name: self.name.clone(),
                version: self.version.clone(),
            },
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request.
    async fn handle_list_tools(&self) -> Result<Value> {
        let tools = match self.tools().await {
            Some(handler) => handler.list_tools(),
            None => Vec::new(),
        };
        let result = ListToolsResult { tools };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request.
    async fn handle_call_tool(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| Error::invalid_args(None, "Missing params"))
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| Error::invalid_args(None, e.to_string()))
            })
            .map_err(|e| JsonRpcError::from_error(&e, "tools/call"))?;

        let context = format!("tool call: {}", params.name);
        self.metrics.inc_tool_calls();
        info!(tool = %params.name, "Tool call");

        let outcome = match self.tools().await {
            Some(handler) => handler.call_tool(&params.name, params.arguments).await,
            None => Err(Error::NotInitialized),
        };

        match outcome {
            Ok(result) => serde_json::to_value(result)
                .map_err(|e| JsonRpcError::from_error(&Error::from(e), &context)),
            Err(e) => {
                self.metrics.inc_tool_failures();
                if e.is_upstream() {
                    self.metrics.inc_upstream_errors();
                }
                warn!(tool = %params.name, "Tool call failed: {}", e);
                Err(JsonRpcError::from_error(&e, &context))
            }
        }
    }
}
