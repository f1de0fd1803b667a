//! Error types for the Cucumber Studio MCP Server.

use thiserror::Error;

use crate::api::types::ApiErrorBody;
use crate::mcp::protocol::error_codes;

/// Result type alias for Cucumber Studio MCP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Cucumber Studio MCP Server.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Upstream API Errors =====
    #[error("{message}")]
    Api {
        status: Option<u16>,
        message: String,
        details: Option<ApiErrorBody>,
    },

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required environment variables: {}", .0.join(", "))]
    CredentialsNotFound(Vec<String>),

    // ===== MCP Errors =====
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters{}: {message}", context_suffix(.context))]
    InvalidToolArguments {
        context: Option<String>,
        message: String,
    },

    #[error("Server not properly initialized")]
    NotInitialized,

    // ===== Transport Errors =====
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("Transport closed: {0}")]
    TransportClosed(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== HTTP Errors =====
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP server error: {0}")]
    HttpServer(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|c| format!(" for {}", c))
        .unwrap_or_default()
}

impl Error {
    /// Create an upstream API error from an HTTP status and optional error body.
    pub fn api(status: Option<u16>, message: impl Into<String>, details: Option<ApiErrorBody>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            details,
        }
    }

    /// Create a parameter validation error.
    pub fn invalid_args(context: Option<&str>, message: impl Into<String>) -> Self {
        Self::InvalidToolArguments {
            context: context.map(String::from),
            message: message.into(),
        }
    }

    /// Whether this error came from the upstream API or the network below it.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Http(_))
    }

    /// JSON-RPC error code used when this error is reported to an MCP client.
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            Self::InvalidToolArguments { .. } => error_codes::INVALID_PARAMS,
            Self::ToolNotFound(_) | Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::Config(_) | Self::CredentialsNotFound(_) => error_codes::INVALID_REQUEST,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Render this error as a protocol message, prefixed with call context.
    pub fn to_protocol_message(&self, context: &str) -> String {
        match self {
            Self::Api { .. } => format!("Cucumber Studio API error ({}): {}", context, self),
            Self::Http(e) => format!(
                "Network error ({}): {}. Please check your connection and API credentials.",
                context, e
            ),
            Self::Config(_) | Self::CredentialsNotFound(_) => format!(
                "Configuration error: {}. Please check your environment settings.",
                self
            ),
            Self::InvalidToolArguments { .. }
            | Self::ToolNotFound(_)
            | Self::MethodNotFound(_)
            | Self::NotInitialized => self.to_string(),
            _ => format!("{}: {}", context, self),
        }
    }
}
