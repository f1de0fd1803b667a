//! Configuration management for the Cucumber Studio MCP Server.

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default Cucumber Studio API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://studio.cucumberstudio.com/api";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default bind host. Loopback only unless overridden.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Environment variables that must be set for upstream access.
pub const REQUIRED_CREDENTIAL_VARS: [&str; 3] = [
    "CUCUMBERSTUDIO_ACCESS_TOKEN",
    "CUCUMBERSTUDIO_CLIENT_ID",
    "CUCUMBERSTUDIO_UID",
];

/// Command-line arguments for the Cucumber Studio MCP server.
#[derive(Parser, Debug, Clone)]
#[command(name = "cucumberstudio-mcp")]
#[command(author = "Cucumber Studio MCP Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server exposing Cucumber Studio test data to LLM clients")]
pub struct Args {
    /// Cucumber Studio API base URL
    #[arg(long, default_value = DEFAULT_API_BASE_URL, env = "CUCUMBERSTUDIO_BASE_URL")]
    pub base_url: String,

    /// Cucumber Studio access token
    #[arg(long, env = "CUCUMBERSTUDIO_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Cucumber Studio client id
    #[arg(long, env = "CUCUMBERSTUDIO_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// Cucumber Studio user id (email)
    #[arg(long, env = "CUCUMBERSTUDIO_UID")]
    pub uid: Option<String>,

    /// Transport mode: stdio, http or streamable-http
    #[arg(short, long, default_value = "stdio", env = "MCP_TRANSPORT", ignore_case = true)]
    pub transport: Transport,

    /// HTTP port (only for http transports)
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MCP_PORT")]
    pub port: u16,

    /// HTTP bind host (only for http transports)
    #[arg(long, default_value = DEFAULT_HOST, env = "MCP_HOST")]
    pub host: String,

    /// Enable permissive CORS (any value but "false" enables it)
    #[arg(long, default_value = "true", env = "MCP_CORS_ORIGIN")]
    pub cors_origin: String,

    /// Answer POST requests with plain JSON instead of event streams
    #[arg(long, env = "MCP_JSON_RESPONSE")]
    pub json_response: bool,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Log output format
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Log upstream API responses
    #[arg(long, env = "LOG_API_RESPONSES")]
    pub log_api_responses: bool,

    /// Log upstream request bodies
    #[arg(long, env = "LOG_REQUEST_BODIES")]
    pub log_request_bodies: bool,

    /// Log upstream response bodies
    #[arg(long, env = "LOG_RESPONSE_BODIES")]
    pub log_response_bodies: bool,
}

/// Transport mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
    StreamableHttp,
}

impl Transport {
    /// Whether this mode serves over HTTP.
    pub fn is_http(&self) -> bool {
        matches!(self, Transport::Http | Transport::StreamableHttp)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Upstream logging switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub log_api_responses: bool,
    pub log_request_bodies: bool,
    pub log_response_bodies: bool,
}

/// Resolved upstream credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub client_id: String,
    pub uid: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &crate::REDACTED)
            .field("client_id", &crate::REDACTED)
            .field("uid", &self.uid)
            .finish()
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream API base URL
    pub base_url: String,
    /// Access token
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Client id
    #[serde(skip_serializing)]
    pub client_id: Option<String>,
    /// User id
    pub uid: Option<String>,
    /// Transport mode
    pub transport: Transport,
    /// HTTP port
    pub port: u16,
    /// HTTP bind host
    pub host: String,
    /// Permissive CORS enabled
    pub cors_origin: bool,
    /// Plain JSON replies on POST
    pub json_response: bool,
    /// Logging switches
    pub logging: LoggingConfig,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            base_url: args.base_url,
            access_token: args.access_token,
            client_id: args.client_id,
            uid: args.uid,
            transport: args.transport,
            port: args.port,
            host: args.host,
            cors_origin: cors_enabled(&args.cors_origin),
            json_response: args.json_response,
            logging: LoggingConfig {
                level: args.log_level,
                format: args.log_format,
                log_api_responses: args.log_api_responses,
                log_request_bodies: args.log_request_bodies,
                log_response_bodies: args.log_response_bodies,
            },
        }
    }
}

/// Only the literal `false` disables CORS.
pub fn cors_enabled(value: &str) -> bool {
    value.trim() != "false"
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            client_id: None,
            uid: None,
            transport: Transport::Stdio,
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            cors_origin: true,
            json_response: false,
            logging: LoggingConfig {
                level: "info".to_string(),
                ..LoggingConfig::default()
            },
        }
    }
}

impl Config {
    /// Load `.env` (if present) and parse arguments and environment.
    pub fn load() -> Self {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        Args::parse().into()
    }

    /// Resolve the upstream credentials, naming every missing variable.
    pub fn credentials(&self) -> Result<Credentials> {
        let values = [&self.access_token, &self.client_id, &self.uid];
        let missing: Vec<String> = REQUIRED_CREDENTIAL_VARS
            .iter()
            .zip(values.iter())
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(Error::CredentialsNotFound(missing));
        }

        Ok(Credentials {
            access_token: self.access_token.clone().unwrap_or_default(),
            client_id: self.client_id.clone().unwrap_or_default(),
            uid: self.uid.clone().unwrap_or_default(),
        })
    }

    /// Validate the whole configuration for startup.
    pub fn validate(&self) -> Result<()> {
        self.credentials()?;

        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL '{}': {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be between 1 and 65535".to_string()));
        }
        Ok(())
    }

    /// Bind address for the HTTP transport.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
