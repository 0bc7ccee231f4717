//! Declarative route maps.
//!
//! A route map table expresses the classification rule as data: each entry names a set of
//! methods, a path pattern and the capability kind it produces. The table is evaluated in order
//! and the first matching entry wins; operations no entry matches fall through to
//! [`classify`](crate::classify::classify). The default table reproduces `classify` exactly, and
//! is also what the server describes to clients.

use crate::classify::{CapabilityKind, HttpMethod, OperationDescriptor, classify};
use crate::config::RouteMapConfig;
use crate::error::{OpenApiToolsError, Result};
use regex::Regex;
use serde::Serialize;

const PLACEHOLDER_PATTERN: &str = r"\{[^}]+\}";
const ANY_PATTERN: &str = r".*";

#[derive(Debug, Clone)]
pub struct RouteMap {
    methods: Vec<HttpMethod>,
    pattern: Regex,
    kind: CapabilityKind,
    description: String,
}

/// Serializable view of one route map entry.
#[derive(Debug, Clone, Serialize)]
pub struct RouteMapInfo {
    pub priority: usize,
    pub methods: Vec<HttpMethod>,
    pub pattern: String,
    pub kind: CapabilityKind,
    pub description: String,
}

impl RouteMap {
    /// # Errors
    ///
    /// Returns a configuration error for an empty method set, an invalid regex, or a resource
    /// kind reached through any method other than GET (resource reads must not change state).
    pub fn new(
        methods: Vec<HttpMethod>,
        pattern: &str,
        kind: CapabilityKind,
        description: impl Into<String>,
    ) -> Result<Self> {
        if methods.is_empty() {
            return Err(OpenApiToolsError::Config(format!(
                "route map '{pattern}' has no methods"
            )));
        }
        if kind != CapabilityKind::Tool
            && let Some(method) = methods.iter().find(|m| **m != HttpMethod::Get)
        {
            return Err(OpenApiToolsError::Config(format!(
                "route map '{pattern}' maps {method} to {kind}; only GET can become a resource"
            )));
        }
        let pattern = Regex::new(pattern).map_err(|e| {
            OpenApiToolsError::Config(format!("invalid route map pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            methods,
            pattern,
            kind,
            description: description.into(),
        })
    }

    /// The built-in table: templated GET, plain GET, then every mutating method.
    #[must_use]
    pub fn defaults() -> Vec<RouteMap> {
        let entries = [
            (
                vec![HttpMethod::Get],
                PLACEHOLDER_PATTERN,
                CapabilityKind::ResourceTemplate,
                "GET with path parameters becomes a resource template",
            ),
            (
                vec![HttpMethod::Get],
                ANY_PATTERN,
                CapabilityKind::Resource,
                "GET without path parameters becomes a static resource",
            ),
            (
                vec![
                    HttpMethod::Post,
                    HttpMethod::Put,
                    HttpMethod::Patch,
                    HttpMethod::Delete,
                ],
                ANY_PATTERN,
                CapabilityKind::Tool,
                "POST, PUT, PATCH and DELETE become tools",
            ),
        ];

        entries
            .into_iter()
            .filter_map(|(methods, pattern, kind, description)| {
                Regex::new(pattern).ok().map(|pattern| RouteMap {
                    methods,
                    pattern,
                    kind,
                    description: description.to_string(),
                })
            })
            .collect()
    }

    /// Build a table from configuration entries.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown method tokens or invalid patterns.
    pub fn from_configs(configs: &[RouteMapConfig]) -> Result<Vec<RouteMap>> {
        configs
            .iter()
            .map(|cfg| {
                let methods = cfg
                    .methods
                    .iter()
                    .map(|m| {
                        HttpMethod::parse(m).ok_or_else(|| {
                            OpenApiToolsError::Config(format!(
                                "unsupported method '{m}' in route map '{}'",
                                cfg.pattern
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let description = cfg
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("custom route map ({})", cfg.kind));
                RouteMap::new(methods, &cfg.pattern, cfg.kind, description)
            })
            .collect()
    }

    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// Whether this entry applies to `op`.
    #[must_use]
    pub fn matches(&self, op: &OperationDescriptor) -> bool {
        self.methods.contains(&op.method()) && self.pattern.is_match(op.path())
    }

    #[must_use]
    pub fn info(&self, priority: usize) -> RouteMapInfo {
        RouteMapInfo {
            priority,
            methods: self.methods.clone(),
            pattern: self.pattern.as_str().to_string(),
            kind: self.kind,
            description: self.description.clone(),
        }
    }
}

/// Classify `op` against `maps`; first match wins, no match falls back to [`classify`].
#[must_use]
pub fn classify_with(maps: &[RouteMap], op: &OperationDescriptor) -> CapabilityKind {
    maps.iter()
        .find(|m| m.matches(op))
        .map_or_else(|| classify(op), RouteMap::kind)
}

/// Describe a table, priorities starting at 1.
#[must_use]
pub fn describe(maps: &[RouteMap]) -> Vec<RouteMapInfo> {
    maps.iter()
        .enumerate()
        .map(|(i, m)| m.info(i + 1))
        .collect()
}
