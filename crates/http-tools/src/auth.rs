//! Per-request credential resolution.
//!
//! The R2R API key is looked up from a [`SettingSource`] every time a request is about to be sent.
//! Nothing here stores the resolved secret: deployments may inject the key after the process has
//! started, or rotate it without a restart, and the next request must see the new value.

use r2r_mcp_env::{ProcessEnv, SettingSource, vars};
use reqwest::RequestBuilder;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::fmt;
use std::sync::Arc;

/// Scheme prefix used for the R2R API key.
pub const BEARER_SCHEME: &str = "Bearer";

/// A resolved `Authorization` header.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    scheme: &'static str,
    secret: String,
}

impl AuthorizationHeader {
    #[must_use]
    pub fn bearer(secret: impl Into<String>) -> Self {
        Self {
            scheme: BEARER_SCHEME,
            secret: secret.into(),
        }
    }

    /// Header name (`authorization`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        "authorization"
    }

    /// Full header value, e.g. `Bearer abc123`.
    #[must_use]
    pub fn value(&self) -> String {
        format!("{} {}", self.scheme, self.secret)
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.scheme
    }

    /// The value as a header marked sensitive, or `None` when the secret contains bytes that
    /// are not allowed in a header value.
    #[must_use]
    pub fn to_header_value(&self) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&self.value()).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl fmt::Debug for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationHeader")
            .field("scheme", &self.scheme)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Builds the `Authorization` header for outgoing R2R requests from the current settings.
#[derive(Clone)]
pub struct CredentialResolver {
    source: Arc<dyn SettingSource>,
    key: String,
}

impl CredentialResolver {
    /// Resolver reading [`vars::API_KEY`] from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn SettingSource>) -> Self {
        Self {
            source,
            key: vars::API_KEY.to_string(),
        }
    }

    /// Resolver reading [`vars::API_KEY`] from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }

    /// Read a different setting name.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Name of the setting the secret is read from.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resolve the header from the current value of the setting.
    ///
    /// An unset or empty setting yields `None`, never an empty header.
    #[must_use]
    pub fn resolve(&self) -> Option<AuthorizationHeader> {
        self.source
            .get_non_empty(&self.key)
            .map(AuthorizationHeader::bearer)
    }

    /// Whether a credential is available right now.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.resolve().is_some()
    }

    /// Attach the current credential to `request`.
    ///
    /// Call immediately before `send()`. Without a credential the request is returned unchanged
    /// and R2R decides whether it needs authentication.
    #[must_use]
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let Some(header) = self.resolve() else {
            tracing::warn!(
                setting = %self.key,
                "no R2R API key configured; sending request without Authorization header"
            );
            return request;
        };

        match header.to_header_value() {
            Some(value) => request.header(AUTHORIZATION, value),
            None => {
                tracing::warn!(
                    setting = %self.key,
                    "R2R API key contains characters not allowed in a header; sending request without it"
                );
                request
            }
        }
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
