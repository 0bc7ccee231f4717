//! Outbound HTTP plumbing shared by the R2R MCP crates.
//!
//! Everything that talks to R2R over HTTP goes through here: per-request credential resolution,
//! method semantics for MCP tool annotations, response decoding and error redaction.

pub mod auth;
pub mod client;
pub mod error;
pub mod method;
pub mod safety;

pub use auth::{AuthorizationHeader, CredentialResolver};
pub use error::{HttpToolsError, Result};
pub use method::HttpMethod;
