//! `OpenAPI` → MCP capability generation for the R2R MCP server.
//!
//! The R2R `OpenAPI` document is loaded once at startup. Every supported operation is classified
//! (see [`classify`]) and published as an MCP tool, resource or resource template by
//! [`runtime::OpenApiCapabilitySource`], which also executes the upstream requests.

pub mod classify;
pub mod config;
pub mod document;
pub mod error;
pub mod resolver;
pub mod route_map;
pub mod runtime;
pub mod uri;

pub use classify::{CapabilityKind, HttpMethod, OperationDescriptor, classify};
pub use config::{ApiServerConfig, AutoDiscoverConfig, RouteMapConfig};
pub use error::{OpenApiToolsError, Result};
pub use route_map::{RouteMap, RouteMapInfo, classify_with};
pub use runtime::{CapabilityCounts, OpenApiCapabilitySource, Registration};
