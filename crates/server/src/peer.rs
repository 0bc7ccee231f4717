//! [`Sampler`] and [`Notifier`] over a live rmcp peer.

use crate::context::{LogLevel, Notifier, Sampler, SamplingRequest};
use crate::error::{Result, ServerError};
use async_trait::async_trait;
use parking_lot::RwLock;
use rmcp::model::{LoggingLevel, Meta};
use rmcp::service::{Peer, RoleServer};
use serde_json::{Value, json};
use std::sync::Arc;

/// Minimum level forwarded to the client, shared by every request of one session.
#[derive(Debug, Clone)]
pub struct LogThreshold(Arc<RwLock<LogLevel>>);

impl Default for LogThreshold {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(LogLevel::Debug)))
    }
}

impl LogThreshold {
    pub fn set(&self, level: LoggingLevel) {
        *self.0.write() = from_mcp_level(level);
    }

    #[must_use]
    pub fn allows(&self, level: LogLevel) -> bool {
        level >= *self.0.read()
    }
}

/// Collapse the eight MCP levels onto the four the server emits.
fn from_mcp_level(level: LoggingLevel) -> LogLevel {
    let name = serde_json::to_value(level)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    match name.as_str() {
        "debug" => LogLevel::Debug,
        "info" => LogLevel::Info,
        "notice" | "warning" => LogLevel::Warning,
        _ => LogLevel::Error,
    }
}

/// Progress token from a request's `_meta`, if the client sent one.
#[must_use]
pub fn progress_token(meta: &Meta) -> Option<Value> {
    serde_json::to_value(meta)
        .ok()
        .and_then(|m| m.get("progressToken").cloned())
        .filter(|t| !t.is_null())
}

pub struct McpPeer {
    peer: Peer<RoleServer>,
    progress_token: Option<Value>,
    threshold: LogThreshold,
}

impl McpPeer {
    #[must_use]
    pub fn new(peer: Peer<RoleServer>, progress_token: Option<Value>, threshold: LogThreshold) -> Self {
        Self {
            peer,
            progress_token,
            threshold,
        }
    }
}

#[async_trait]
impl Sampler for McpPeer {
    async fn sample(&self, request: SamplingRequest) -> Result<String> {
        let params = serde_json::from_value(sampling_params(&request))?;
        let result = self
            .peer
            .create_message(params)
            .await
            .map_err(|e| ServerError::Sampling(e.to_string()))?;
        let value = serde_json::to_value(&result)?;
        completion_text(&value)
            .ok_or_else(|| ServerError::Sampling("completion carried no text content".to_string()))
    }
}

#[async_trait]
impl Notifier for McpPeer {
    async fn log(&self, level: LogLevel, message: &str) {
        if !self.threshold.allows(level) {
            return;
        }
        let params = json!({
            "level": level.as_str(),
            "logger": "r2r-mcp-server",
            "data": message,
        });
        let Ok(params) = serde_json::from_value(params) else {
            return;
        };
        if let Err(e) = self.peer.notify_logging_message(params).await {
            tracing::debug!(error = %e, "failed to send logging notification");
        }
    }

    async fn progress(&self, progress: f64, total: Option<f64>) {
        let Some(token) = &self.progress_token else {
            return;
        };
        let mut params = json!({ "progressToken": token, "progress": progress });
        if let Some(total) = total {
            params["total"] = json!(total);
        }
        let Ok(params) = serde_json::from_value(params) else {
            return;
        };
        if let Err(e) = self.peer.notify_progress(params).await {
            tracing::debug!(error = %e, "failed to send progress notification");
        }
    }
}

fn sampling_params(request: &SamplingRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|(role, text)| {
            json!({
                "role": role,
                "content": { "type": "text", "text": text },
            })
        })
        .collect();
    let mut params = json!({
        "messages": messages,
        "maxTokens": request.max_tokens,
    });
    if let Some(system) = &request.system_prompt {
        params["systemPrompt"] = json!(system);
    }
    if let Some(t) = request.temperature {
        params["temperature"] = json!(t);
    }
    params
}

/// Text of a `sampling/createMessage` result. Content may be a single block, a list of blocks, or
/// nested under `message`.
fn completion_text(result: &Value) -> Option<String> {
    let content = result
        .get("content")
        .or_else(|| result.get("message").and_then(|m| m.get("content")))?;
    match content {
        Value::Object(_) => content.get("text").and_then(Value::as_str).map(str::to_string),
        Value::Array(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            (!texts.is_empty()).then(|| texts.join("\n"))
        }
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
