//! Builds one fully wired [`McpServer`] per session.

use std::sync::Arc;
use tracing::{error, info};

use crate::api::client::{http_client_factory, ApiClientFactory, CucumberStudioApi};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mcp::handler::McpHandler;
use crate::mcp::server::{McpServer, ToolInstaller};
use crate::metrics::Metrics;
use crate::tools::register_all_tools;

/// Message reported when the startup connection probe fails.
pub const CONNECTION_FAILED: &str =
    "Failed to connect to Cucumber Studio API. Please check your credentials.";

/// Creates MCP servers bound to the Cucumber Studio API.
#[derive(Clone)]
pub struct ServerFactory {
    config: Config,
    client_factory: ApiClientFactory,
    metrics: Arc<Metrics>,
}

impl ServerFactory {
    /// Factory using the reqwest client for `config`.
    pub fn new(config: Config, metrics: Arc<Metrics>) -> Self {
        let client_factory = http_client_factory(config.clone());
        Self::with_client_factory(config, client_factory, metrics)
    }

    /// Factory with a custom client constructor.
    pub fn with_client_factory(
        config: Config,
        client_factory: ApiClientFactory,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            client_factory,
            metrics,
        }
    }

    /// Build the tool registry over a fresh upstream client.
    fn installer(&self) -> ToolInstaller {
        let config = self.config.clone();
        let client_factory = self.client_factory.clone();
        Arc::new(move || {
            config.credentials()?;
            let client = client_factory()?;
            Ok(tool_registry(client))
        })
    }

    /// Create a server for one session.
    ///
    /// Configuration failures are logged, not returned: the server comes up
    /// without tools and retries installation when tools are requested.
    pub async fn create(&self) -> Arc<McpServer> {
        let server = McpServer::with_installer(self.installer()).with_metrics(self.metrics.clone());
        match server.install_tools().await {
            Ok(()) => info!("MCP server created"),
            Err(e) => error!("Failed to initialize tools, will retry on demand: {}", e),
        }
        Arc::new(server)
    }

    /// Create a server, failing on configuration errors or an unreachable API.
    pub async fn create_strict(&self) -> Result<Arc<McpServer>> {
        self.config.credentials()?;
        let client = (self.client_factory)()?;
        if !client.test_connection().await {
            return Err(Error::Config(CONNECTION_FAILED.to_string()));
        }
        info!("Connected to Cucumber Studio API");

        let server = McpServer::new(tool_registry(client)).with_metrics(self.metrics.clone());
        Ok(Arc::new(server))
    }
}

fn tool_registry(client: Arc<dyn CucumberStudioApi>) -> McpHandler {
    let mut handler = McpHandler::new();
    register_all_tools(&mut handler, client);
    handler
}
