//! Redaction helpers for anything derived from an outbound request that may end up in logs or in
//! an MCP error message.

use url::Url;

/// Upper bound on upstream error bodies carried in error messages.
pub const MAX_ERROR_BODY_CHARS: usize = 2048;

/// Render a URL without credentials, query string or fragment.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// `reqwest::Error` display with its URL replaced by the redacted form.
#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

/// Clip an upstream body to [`MAX_ERROR_BODY_CHARS`] characters.
#[must_use]
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push_str("...(truncated)");
    out
}
