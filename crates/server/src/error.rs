//! Error types for the MCP server.

use r2r_mcp_client::R2rError;
use r2r_mcp_openapi_tools::OpenApiToolsError;
use rmcp::ErrorData;
use thiserror::Error;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration errors (invalid YAML, bad route maps, unusable URLs)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (document failed to load, discovery failed)
    #[error("Startup error: {0}")]
    Startup(String),

    /// Tool or prompt arguments that do not fit the declared schema
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The connected client could not produce a completion
    #[error("Sampling failed: {0}")]
    Sampling(String),

    /// A pipeline step failed; carries the step name
    #[error("Pipeline step '{step}' failed: {message}")]
    Step { step: String, message: String },

    /// Generated `OpenAPI` capabilities
    #[error(transparent)]
    OpenApi(#[from] OpenApiToolsError),

    /// Typed R2R client calls
    #[error(transparent)]
    R2r(#[from] R2rError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ServerError {
    /// Whether the failure is the caller's fault rather than the server's or R2R's.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::InvalidArguments(_) => true,
            Self::OpenApi(e) => matches!(e, OpenApiToolsError::Runtime(_)),
            Self::R2r(e) => matches!(e, R2rError::InvalidInput(_)),
            _ => false,
        }
    }
}

impl From<ServerError> for ErrorData {
    fn from(e: ServerError) -> Self {
        match &e {
            ServerError::OpenApi(OpenApiToolsError::UnknownTool(_)) => {
                ErrorData::invalid_params(e.to_string(), None)
            }
            _ if e.is_invalid_input() => ErrorData::invalid_params(e.to_string(), None),
            _ => ErrorData::internal_error(e.to_string(), None),
        }
    }
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
