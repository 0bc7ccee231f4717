//! The HTTP methods R2R operations are exposed through, and their RFC 9110 semantics.

use reqwest::Method;
use rmcp::model::ToolAnnotations;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five methods the server maps onto MCP capabilities.
///
/// Anything else (`HEAD`, `OPTIONS`, `TRACE`, extension methods) has no representation here;
/// [`HttpMethod::parse`] returns `None` for it and callers skip the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    /// Case-insensitive parse of a method token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the method may change server state.
    #[must_use]
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Get)
    }

    #[must_use]
    pub fn to_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    /// MCP tool annotations derived from the method.
    ///
    /// `openWorldHint` is always set: every generated tool talks to R2R. `PATCH` leaves
    /// `idempotentHint` unset since it may or may not be idempotent.
    #[must_use]
    pub fn annotations(self, title: Option<String>) -> ToolAnnotations {
        let (read_only, destructive, idempotent) = match self {
            Self::Get => (true, false, Some(true)),
            Self::Post => (false, false, Some(false)),
            Self::Put | Self::Delete => (false, true, Some(true)),
            Self::Patch => (false, true, None),
        };
        ToolAnnotations {
            title,
            read_only_hint: Some(read_only),
            destructive_hint: Some(destructive),
            idempotent_hint: idempotent,
            open_world_hint: Some(true),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
