//! MCP transport layer implementations.
//!
//! The stdio transport lives here; the Streamable HTTP transport is in
//! [`crate::http`].

use async_trait::async_trait;
use serde_json::Value;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Capacity of the stdio message channels.
pub(crate) const CHANNEL_CAPACITY: usize = 100;

/// A message that can be sent or received.
#[derive(Debug, Clone)]
pub enum Message {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl Message {
    /// Classify a raw JSON-RPC object.
    ///
    /// An object with `method` and `id` is a request, `method` alone a
    /// notification, and `result` or `error` with an `id` a response.
    pub fn from_value(value: Value) -> Result<Self> {
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some_and(|id| !id.is_null());

        let message = if has_method && has_id {
            Message::Request(serde_json::from_value(value)?)
        } else if has_method {
            Message::Notification(serde_json::from_value(value)?)
        } else if has_id && (value.get("result").is_some() || value.get("error").is_some()) {
            Message::Response(serde_json::from_value(value)?)
        } else {
            return Err(Error::McpProtocol(
                "message is not a JSON-RPC request, notification or response".to_string(),
            ));
        };
        Ok(message)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Message::Request(req) => serde_json::to_string(req)?,
            Message::Response(res) => serde_json::to_string(res)?,
            Message::Notification(notif) => serde_json::to_string(notif)?,
        };
        Ok(json)
    }

    /// Whether this message expects a response.
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport, returning channels for messages.
    async fn start(&mut self) -> Result<(
        mpsc::Receiver<Message>,
        mpsc::Sender<Message>,
    )>;

    /// Stop the transport.
    async fn stop(&mut self) -> Result<()>;
}

/// Stdio transport for MCP.
pub struct StdioTransport {
    running: bool,
}

impl StdioTransport {
    /// Create a new stdio transport.
    pub fn new() -> Self {
        Self { running: false }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<Message>)> {
        self.running = true;

        // Channel for incoming messages (from stdin)
        let (incoming_tx, incoming_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        // Channel for outgoing messages (to stdout)
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);

        // Spawn stdin reader task
        let tx = incoming_tx.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = BufReader::new(stdin);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("EOF on stdin, stopping transport");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }

                        trace!("Received: {}", trimmed);

                        let parsed = serde_json::from_str::<Value>(trimmed)
                            .map_err(Error::from)
                            .and_then(Message::from_value);
                        match parsed {
                            Ok(msg) => {
                                if tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => error!("Failed to parse message: {}", e),
                        }
                    }
                    Err(e) => {
                        error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        // Spawn stdout writer task
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();

            while let Some(msg) = outgoing_rx.recv().await {
                match msg.to_json() {
                    Ok(s) => {
                        trace!("Sending: {}", s);
                        if let Err(e) = stdout.write_all(s.as_bytes()).await {
                            error!("Error writing to stdout: {}", e);
                            break;
                        }
                        if let Err(e) = stdout.write_all(b"\n").await {
                            error!("Error writing newline: {}", e);
                            break;
                        }
                        if let Err(e) = stdout.flush().await {
                            error!("Error flushing stdout: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error serializing message: {}", e);
                    }
                }
            }
        });

        Ok((incoming_rx, outgoing_tx))
    }

    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_classification() {
        let req = Message::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert!(req.is_request());

        let notif = Message::from_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .unwrap();
        assert!(matches!(notif, Message::Notification(_)));

        let res = Message::from_value(json!({"jsonrpc": "2.0", "id": "a", "result": {}})).unwrap();
        assert!(matches!(res, Message::Response(_)));

        assert!(Message::from_value(json!({"jsonrpc": "2.0"})).is_err());
        assert!(Message::from_value(json!("ping")).is_err());
    }

    #[test]
    fn test_message_to_json() {
        let msg = Message::Notification(JsonRpcNotification::new("notifications/tools/list_changed"));
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#
        );
    }
}
