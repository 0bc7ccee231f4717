//! HTTP client construction and response decoding.

use crate::error::{HttpToolsError, Result};
use crate::safety::{sanitize_reqwest_error, truncate_body};
use base64::Engine as _;
use mime::Mime;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use std::time::Duration;

/// Per-request timeout applied when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: usize = 10;

/// Build the shared client: optional request timeout, redirects followed.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_client(timeout: Option<Duration>) -> Result<Client> {
    let mut builder =
        Client::builder().redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| {
            HttpToolsError::Config(format!(
                "failed to build HTTP client: {}",
                sanitize_reqwest_error(&e)
            ))
        })
}

/// A decoded upstream response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text {
        text: String,
        mime_type: Option<String>,
    },
    Binary {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
}

impl ResponseBody {
    /// Decode raw bytes using the response content type.
    ///
    /// Images and non-UTF-8 bodies stay binary. Anything that parses as JSON becomes
    /// [`ResponseBody::Json`] whatever the declared type; the rest is text.
    #[must_use]
    pub fn decode(bytes: &[u8], content_type: Option<&str>) -> Self {
        let mime_type = content_type.map(str::to_string);
        let parsed: Option<Mime> = content_type.and_then(|ct| ct.parse().ok());

        let Ok(text) = std::str::from_utf8(bytes) else {
            return Self::Binary {
                bytes: bytes.to_vec(),
                mime_type,
            };
        };

        let is_image = parsed.as_ref().is_some_and(|m| m.type_() == mime::IMAGE);

        if is_image {
            return Self::Binary {
                bytes: bytes.to_vec(),
                mime_type,
            };
        }

        match serde_json::from_str::<Value>(text) {
            Ok(v) => Self::Json(v),
            Err(_) => Self::Text {
                text: text.to_string(),
                mime_type,
            },
        }
    }

    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Self::Json(_) => Some("application/json"),
            Self::Text { mime_type, .. } | Self::Binary { mime_type, .. } => mime_type.as_deref(),
        }
    }

    /// JSON view of the body. Binary bodies are wrapped as base64.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(v) => v,
            Self::Text { text, .. } => Value::String(text),
            Self::Binary { bytes, mime_type } => json!({
                "encoding": "base64",
                "mimeType": mime_type,
                "data": base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
        }
    }

    /// Text view of the body: JSON is pretty-printed, binary is base64.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Json(v) => serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string()),
            Self::Text { text, .. } => text,
            Self::Binary { bytes, .. } => base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// Read and decode a response body regardless of status.
///
/// # Errors
///
/// Returns a transport error if the body cannot be read.
pub async fn read_body(response: Response) -> Result<ResponseBody> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.bytes().await?;
    Ok(ResponseBody::decode(&bytes, content_type.as_deref()))
}

/// Read the body of a successful response, turning non-2xx statuses into
/// [`HttpToolsError::Status`].
///
/// # Errors
///
/// Returns an error for non-2xx responses or when the body cannot be read.
pub async fn expect_success(response: Response) -> Result<ResponseBody> {
    let status = response.status();
    let body = read_body(response).await?;
    if status.is_success() {
        return Ok(body);
    }

    let text = match body {
        ResponseBody::Json(v) => v.to_string(),
        other => other.into_text(),
    };
    Err(HttpToolsError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        body: truncate_body(&text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    #[test]
    fn decode_json_text_and_binary() {
        assert_eq!(
            ResponseBody::decode(br#"{"a":1}"#, Some("application/json")),
            ResponseBody::Json(json!({"a": 1}))
        );
        assert_eq!(
            ResponseBody::decode(b"plain words", Some("text/plain")),
            ResponseBody::Text {
                text: "plain words".into(),
                mime_type: Some("text/plain".into())
            }
        );
        let png = ResponseBody::decode(&[0x89, b'P', b'N', b'G'], Some("image/png"));
        assert!(matches!(png, ResponseBody::Binary { .. }));
        assert_eq!(png.mime_type(), Some("image/png"));
        let v = png.into_value();
        assert_eq!(v["encoding"], "base64");
        assert_eq!(v["mimeType"], "image/png");
    }

    #[test]
    fn decode_problem_json_suffix() {
        let body = ResponseBody::decode(br#"{"detail":"x"}"#, Some("application/problem+json"));
        assert_eq!(body, ResponseBody::Json(json!({"detail": "x"})));
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn expect_success_maps_status_errors() {
        let app = Router::new()
            .route("/ok", get(|| async { axum::Json(json!({"results": []})) }))
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, "no such document") }),
            );
        let base = spawn(app).await;
        let client = build_client(Some(DEFAULT_TIMEOUT)).expect("client");

        let ok = client
            .get(format!("{base}/ok"))
            .send()
            .await
            .expect("send");
        let body = expect_success(ok).await.expect("success");
        assert_eq!(body.into_value(), json!({"results": []}));

        let missing = client
            .get(format!("{base}/missing"))
            .send()
            .await
            .expect("send");
        let err = expect_success(missing).await.expect_err("404");
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.to_string(),
            "API returned 404 Not Found: no such document"
        );
    }
}
