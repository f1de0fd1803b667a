//! Cucumber Studio MCP Server
//!
//! A Model Context Protocol (MCP) server that exposes Cucumber Studio
//! projects, scenarios, action words and test runs to LLM clients as
//! read-only tools.
//!
//! # Architecture
//!
//! 1. **API Layer** (`api`) - Cucumber Studio REST client
//! 2. **Tools Layer** (`tools`) - 14 MCP tools, routed by resource category
//! 3. **MCP Layer** (`mcp`) - Protocol types, per-session server, stdio transport
//! 4. **HTTP Layer** (`http`) - Multi-session Streamable HTTP transport
//!
//! # Transports
//!
//! - **stdio**: one implicit session over stdin/stdout
//! - **streamable-http**: many sessions over one listener, keyed by the
//!   `Mcp-Session-Id` header

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod tools;

pub use error::{Error, Result};

/// Server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "cucumberstudio-mcp";

/// Placeholder for secrets in logs and debug output.
pub const REDACTED: &str = "***REDACTED***";
