//! Mapping of API operations onto MCP capability kinds.
//!
//! The rule is fixed and priority ordered (first match wins):
//!
//! 1. `POST`, `PUT`, `PATCH`, `DELETE` → [`CapabilityKind::Tool`]
//! 2. `GET` with a `{...}` placeholder in the path → [`CapabilityKind::ResourceTemplate`]
//! 3. any other `GET` → [`CapabilityKind::Resource`]
//!
//! Only the path portion of a template (the text before any `?`) is inspected; query strings
//! never change the outcome.

use crate::error::{OpenApiToolsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use r2r_mcp_http_tools::HttpMethod;

/// What an operation is published as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
    ResourceTemplate,
}

impl CapabilityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::ResourceTemplate => "resource_template",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One API endpoint as read from the `OpenAPI` document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OperationDescriptor {
    method: HttpMethod,
    path_template: String,
    name: String,
}

impl OperationDescriptor {
    /// # Errors
    ///
    /// Returns a configuration error when the path template or the name is empty.
    pub fn new(
        method: HttpMethod,
        path_template: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let path_template = path_template.into();
        let name = name.into();
        if path_template.trim().is_empty() {
            return Err(OpenApiToolsError::Config(format!(
                "operation '{name}' has an empty path template"
            )));
        }
        if name.trim().is_empty() {
            return Err(OpenApiToolsError::Config(format!(
                "operation {method} {path_template} has an empty name"
            )));
        }
        Ok(Self {
            method,
            path_template,
            name,
        })
    }

    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    #[must_use]
    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The path template without any query string.
    #[must_use]
    pub fn path(&self) -> &str {
        path_portion(&self.path_template)
    }
}

/// Classify an operation.
#[must_use]
pub fn classify(op: &OperationDescriptor) -> CapabilityKind {
    match op.method {
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete => {
            CapabilityKind::Tool
        }
        HttpMethod::Get if has_path_placeholder(&op.path_template) => {
            CapabilityKind::ResourceTemplate
        }
        HttpMethod::Get => CapabilityKind::Resource,
    }
}

/// The text before the first `?`.
#[must_use]
pub fn path_portion(template: &str) -> &str {
    template.split_once('?').map_or(template, |(path, _)| path)
}

/// Whether the path portion holds at least one `{name}` placeholder.
#[must_use]
pub fn has_path_placeholder(template: &str) -> bool {
    !placeholders(template).is_empty()
}

/// Placeholder names in the path portion, in order of appearance.
#[must_use]
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = path_portion(template);
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() {
            out.push(name);
        }
        rest = &after[end + 1..];
    }
    out
}
