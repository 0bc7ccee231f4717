//! Per-call context handed to the enhanced tools.
//!
//! Tools talk back to the connected client through two seams: a [`Sampler`] that asks the
//! client's LLM for a completion, and a [`Notifier`] that carries log messages and progress.
//! [`crate::peer::McpPeer`] implements both over an rmcp peer; tests substitute scripted ones.

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use rmcp::model::Role;
use serde::Serialize;
use std::sync::Arc;

/// Log levels tools emit. Mirrors the subset of MCP logging levels the server uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One completion request for the client's LLM.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingRequest {
    pub messages: Vec<(Role, String)>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

impl SamplingRequest {
    /// A single user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            messages: vec![(Role::User, text.into())],
            system_prompt: None,
            temperature: None,
            max_tokens: 1000,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait Sampler: Send + Sync {
    /// Text of the client's completion.
    async fn sample(&self, request: SamplingRequest) -> Result<String>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn log(&self, level: LogLevel, message: &str);

    /// Report progress. Implementations drop reports when the request carried no progress token.
    async fn progress(&self, progress: f64, total: Option<f64>);
}

/// Notifier that only writes to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOnly;

#[async_trait]
impl Notifier for TracingOnly {
    async fn log(&self, _level: LogLevel, _message: &str) {}

    async fn progress(&self, _progress: f64, _total: Option<f64>) {}
}

/// Sampler for contexts without a connected client.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSampling;

#[async_trait]
impl Sampler for NoSampling {
    async fn sample(&self, _request: SamplingRequest) -> Result<String> {
        Err(ServerError::Sampling(
            "the connected client does not support sampling".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct ToolContext {
    sampler: Arc<dyn Sampler>,
    notifier: Arc<dyn Notifier>,
}

impl ToolContext {
    #[must_use]
    pub fn new(sampler: Arc<dyn Sampler>, notifier: Arc<dyn Notifier>) -> Self {
        Self { sampler, notifier }
    }

    /// Context that neither samples nor notifies.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Arc::new(NoSampling), Arc::new(TracingOnly))
    }

    pub async fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "r2r_mcp_server::tool", "{message}"),
            LogLevel::Info => tracing::info!(target: "r2r_mcp_server::tool", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "r2r_mcp_server::tool", "{message}"),
            LogLevel::Error => tracing::error!(target: "r2r_mcp_server::tool", "{message}"),
        }
        self.notifier.log(level, message).await;
    }

    pub async fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message).await;
    }

    pub async fn info(&self, message: &str) {
        self.log(LogLevel::Info, message).await;
    }

    pub async fn error(&self, message: &str) {
        self.log(LogLevel::Error, message).await;
    }

    pub async fn report_progress(&self, progress: f64, total: f64) {
        self.notifier.progress(progress, Some(total)).await;
    }

    /// # Errors
    ///
    /// Returns a sampling error when the client rejects or cannot serve the request.
    pub async fn sample(&self, request: SamplingRequest) -> Result<String> {
        self.sampler.sample(request).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted sampler and recording notifier for tool tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Returns queued replies in order; errors once the queue is empty.
    #[derive(Default)]
    pub struct ScriptedSampler {
        replies: Mutex<VecDeque<Result<String>>>,
        pub requests: Mutex<Vec<SamplingRequest>>,
    }

    impl ScriptedSampler {
        pub fn replying<I, S>(replies: I) -> Arc<Self>
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn push_error(&self, message: &str) {
            self.replies
                .lock()
                .push_back(Err(ServerError::Sampling(message.to_string())));
        }

        pub fn push_reply(&self, reply: &str) {
            self.replies.lock().push_back(Ok(reply.to_string()));
        }
    }

    #[async_trait]
    impl Sampler for ScriptedSampler {
        async fn sample(&self, request: SamplingRequest) -> Result<String> {
            self.requests.lock().push(request);
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ServerError::Sampling("no scripted reply".into())))
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub logs: Mutex<Vec<(LogLevel, String)>>,
        pub progress: Mutex<Vec<(f64, Option<f64>)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn log(&self, level: LogLevel, message: &str) {
            self.logs.lock().push((level, message.to_string()));
        }

        async fn progress(&self, progress: f64, total: Option<f64>) {
            self.progress.lock().push((progress, total));
        }
    }

    pub fn context(sampler: &Arc<ScriptedSampler>) -> (ToolContext, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ToolContext::new(sampler.clone(), notifier.clone());
        (ctx, notifier)
    }
}
