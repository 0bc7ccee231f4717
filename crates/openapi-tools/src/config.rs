use crate::classify::CapabilityKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the `OpenAPI` capability source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfig {
    /// `OpenAPI` document location (URL or file path).
    pub spec: String,

    /// Base URL for API calls. Falls back to the first `servers` entry of the document.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Which operations to publish.
    #[serde(default)]
    pub auto_discover: AutoDiscoverConfig,

    /// Route maps consulted before the built-in classification rule.
    #[serde(default)]
    pub route_maps: Vec<RouteMapConfig>,

    /// Per-request timeout in seconds (`0` disables it). Defaults to 30.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Time allowed for loading the document and discovering operations. Defaults to 30.
    #[serde(default)]
    pub startup_timeout_secs: Option<u64>,
}

const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl ApiServerConfig {
    #[must_use]
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            base_url: None,
            auto_discover: AutoDiscoverConfig::default(),
            route_maps: Vec::new(),
            timeout_secs: None,
            startup_timeout_secs: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Effective request timeout; `None` when explicitly disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// Auto-discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AutoDiscoverConfig {
    /// `true` publishes every operation, `false` publishes none.
    Enabled(bool),
    /// Glob filters over `"METHOD /path"`; exclude wins.
    Detailed {
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl Default for AutoDiscoverConfig {
    fn default() -> Self {
        AutoDiscoverConfig::Enabled(true)
    }
}

impl AutoDiscoverConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            AutoDiscoverConfig::Enabled(b) => *b,
            AutoDiscoverConfig::Detailed { .. } => true,
        }
    }

    /// Whether `"METHOD /path"` passes the include/exclude filters.
    #[must_use]
    pub fn allows(&self, operation: &str) -> bool {
        match self {
            AutoDiscoverConfig::Enabled(b) => *b,
            AutoDiscoverConfig::Detailed { include, exclude } => {
                if exclude.iter().any(|p| glob_match(p, operation)) {
                    return false;
                }
                include.is_empty() || include.iter().any(|p| glob_match(p, operation))
            }
        }
    }
}

/// A user-supplied route map entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMapConfig {
    /// Method tokens (`GET`, `post`, ...).
    pub methods: Vec<String>,
    /// Regular expression matched against the path portion of the template.
    pub pattern: String,
    pub kind: CapabilityKind,
    #[serde(default)]
    pub description: Option<String>,
}

/// `*` matches any run of characters, `?` exactly one; everything else (including `{}`) is
/// literal.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some('?') => {
                pi += 1;
                ti += 1;
            }
            Some(c) if *c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => {
                let Some((sp, st)) = star else {
                    return false;
                };
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}
