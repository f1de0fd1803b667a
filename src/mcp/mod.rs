//! Model Context Protocol (MCP) implementation.
//!
//! # Architecture
//!
//! - `protocol` - Core MCP types and message definitions
//! - `server` - MCP server implementation
//! - `factory` - Per-session server construction
//! - `transport` - Stdio transport and message framing
//! - `handler` - Tool handler registry

pub mod factory;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;

pub use factory::ServerFactory;
pub use handler::McpHandler;
pub use protocol::*;
pub use server::McpServer;
pub use transport::{Message, StdioTransport, Transport};
