//! MCP server in front of an R2R deployment.
//!
//! Capabilities come from two places: the R2R `OpenAPI` document, classified into tools,
//! resources and resource templates by route maps, and a fixed set of built-in tools, resources
//! and prompts that layer retrieval pipelines and client-side sampling on top of the API.

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod peer;
pub mod pipelines;
pub mod prompts;
pub mod resources;
pub mod tools;
pub mod transport;

pub use config::{Cli, FileConfig, ServerSettings, Transport};
pub use context::{LogLevel, Notifier, Sampler, SamplingRequest, ToolContext};
pub use error::{Result, ServerError};
pub use handler::{AppState, R2rMcpServer};
pub use pipelines::{Pipeline, StepCache, StepResults};

/// Current time as an RFC 3339 string.
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
