//! Error types for `r2r-mcp-openapi-tools`.

use r2r_mcp_http_tools::HttpToolsError;
use thiserror::Error;

/// Main error type for the `OpenAPI` capability source.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (invalid config, bad route maps, empty descriptors).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (spec failed to load, discovery failed).
    #[error("Startup error: {0}")]
    Startup(String),

    /// Runtime errors (invalid arguments, unmatched URIs).
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// No tool with this name was generated.
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    /// Upstream HTTP failures (transport or non-2xx).
    #[error("HTTP error: {0}")]
    Http(#[from] HttpToolsError),

    /// `OpenAPI` errors (document structure, `$ref` resolution).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    OpenApiSpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    OpenApiSpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    OpenApiSpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON conversion errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OpenApiToolsError {
    /// HTTP status of an upstream rejection, if any.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

/// Result type alias for `OpenAPI` capability operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
