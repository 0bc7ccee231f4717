//! Typed client for the R2R v3 retrieval API.
//!
//! [`R2rClient`] covers search, RAG, the agent endpoint, document ingestion and collections.
//! Anything without a typed wrapper can go through [`R2rClient::request`].

pub mod client;
pub mod error;
pub mod format;
pub mod types;

pub use client::R2rClient;
pub use error::{R2rError, Result};
pub use format::{extract_citations, format_search_results};
pub use types::*;
