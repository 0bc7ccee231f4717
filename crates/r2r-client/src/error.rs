//! Error types for the typed R2R client.

use r2r_mcp_http_tools::HttpToolsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum R2rError {
    /// Transport failures and non-2xx responses.
    #[error(transparent)]
    Http(#[from] HttpToolsError),

    /// Arguments that cannot be turned into a request.
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response from R2R: {0}")]
    Decode(#[from] serde_json::Error),
}

impl R2rError {
    /// HTTP status of an upstream rejection, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, R2rError>;
