//! Command line, environment and config-file settings.

use crate::error::{Result, ServerError};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use r2r_mcp_env::vars;
use r2r_mcp_openapi_tools::{ApiServerConfig, AutoDiscoverConfig, RouteMapConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://localhost:7272";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// JSON-RPC over stdin/stdout (desktop clients)
    Stdio,
    /// Streamable HTTP at `/mcp`
    Http,
}

/// R2R MCP server.
///
/// The R2R API key is never taken from the command line; it is read from `R2R_API_KEY` each time
/// a request is sent.
#[derive(Debug, Clone, Parser)]
#[command(name = "r2r-mcp-server", version, about)]
pub struct Cli {
    /// Base URL of the R2R deployment.
    #[arg(long, env = vars::BASE_URL, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// `OpenAPI` document location (URL or file). Defaults to `<base-url>/openapi.json`.
    #[arg(long, env = vars::OPENAPI_URL)]
    pub openapi_url: Option<String>,

    /// Optional YAML file with `autoDiscover`, `routeMaps` and timeout settings.
    #[arg(long, env = "R2R_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, env = "R2R_MCP_TRANSPORT", default_value = "stdio")]
    pub transport: Transport,

    /// Listen address for the HTTP transport.
    #[arg(long, env = "R2R_MCP_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Raise the default log level to `debug`.
    #[arg(
        long,
        env = vars::DEBUG_LOGGING,
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub debug_logging: bool,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "R2R_MCP_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "R2R_MCP_LOG_JSON", action = ArgAction::SetTrue)]
    pub log_json: bool,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_filter(&self) -> String {
        if self.debug_logging {
            return "debug".to_string();
        }
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    /// Resolve the effective server settings, reading the config file if one was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn settings(&self) -> Result<ServerSettings> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(ServerSettings::new(
            &self.base_url,
            self.openapi_url.clone(),
            self.debug_logging,
            file,
        ))
    }
}

/// Optional YAML configuration file.
///
/// ```yaml
/// autoDiscover:
///   exclude: ["DELETE /v3/users/*"]
/// routeMaps:
///   - methods: [POST]
///     pattern: "^/v3/retrieval/search$"
///     kind: tool
/// timeoutSecs: 60
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub auto_discover: AutoDiscoverConfig,
    #[serde(default)]
    pub route_maps: Vec<RouteMapConfig>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub startup_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML for this structure.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// # Errors
    ///
    /// Returns an error for invalid YAML or unknown keys.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Effective settings the server runs with.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub base_url: String,
    pub openapi_url: String,
    pub debug_logging: bool,
    pub api: ApiServerConfig,
}

impl ServerSettings {
    #[must_use]
    pub fn new(
        base_url: &str,
        openapi_url: Option<String>,
        debug_logging: bool,
        file: FileConfig,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let openapi_url = openapi_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("{base_url}/openapi.json"));

        let mut api = ApiServerConfig::new(openapi_url.clone()).with_base_url(base_url.clone());
        api.auto_discover = file.auto_discover;
        api.route_maps = file.route_maps;
        api.timeout_secs = file.timeout_secs;
        api.startup_timeout_secs = file.startup_timeout_secs;

        Self {
            base_url,
            openapi_url,
            debug_logging,
            api,
        }
    }
}
