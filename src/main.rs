//! Cucumber Studio MCP Server
//!
//! Serves Cucumber Studio tools over stdio or Streamable HTTP.

use std::process::ExitCode;
use tracing::{error, info};

use cucumberstudio_mcp::config::{Config, Transport};
use cucumberstudio_mcp::error::Result;
use cucumberstudio_mcp::http::StreamableHttpServer;
use cucumberstudio_mcp::mcp::{ServerFactory, StdioTransport};
use cucumberstudio_mcp::metrics::Metrics;
use cucumberstudio_mcp::{logging, VERSION};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::load();

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to start Cucumber Studio MCP server: {}", e);
            eprintln!("Failed to start Cucumber Studio MCP server: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    config.validate()?;

    info!("Cucumber Studio MCP Server v{}", VERSION);
    info!("Transport: {:?}", config.transport);
    info!("API base URL: {}", config.base_url);

    let metrics = Metrics::new();
    let factory = ServerFactory::new(config.clone(), metrics.clone());

    match config.transport {
        Transport::Stdio => {
            let server = factory.create_strict().await?;
            info!("Starting stdio transport...");
            server.run(StdioTransport::new()).await?;
        }
        Transport::Http | Transport::StreamableHttp => {
            let server = StreamableHttpServer::new(config, factory, metrics);
            server.start().await?;
            shutdown_signal().await;
            info!("Shutting down...");
            server.close().await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
