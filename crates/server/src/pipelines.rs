//! Sampling helpers and composable async pipelines.
//!
//! The enhanced tools build on [`Pipeline`], [`StepCache`], [`with_fallback`] and
//! [`sample_structured`]. The other helpers are part of the crate's public API for handlers
//! written against [`ToolContext`].

use crate::context::{SamplingRequest, ToolContext};
use crate::error::{Result, ServerError};
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use rmcp::model::Role;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

// ============================================================================
// Sampling helpers
// ============================================================================

/// Plain completion for a single prompt.
///
/// # Errors
///
/// Propagates sampling failures.
pub async fn sample_basic(
    ctx: &ToolContext,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    ctx.sample(
        SamplingRequest::user(prompt)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens),
    )
    .await
}

/// Completion with the model cast as `role` (e.g. "expert data analyst").
///
/// # Errors
///
/// Propagates sampling failures.
pub async fn sample_with_role(ctx: &ToolContext, prompt: &str, role: &str) -> Result<String> {
    ctx.sample(
        SamplingRequest::user(prompt)
            .with_system(format!(
                "You are an {role}. Provide detailed, accurate analysis."
            ))
            .with_temperature(0.3)
            .with_max_tokens(1000),
    )
    .await
}

/// Ask for JSON and parse it. Output that is not valid JSON comes back as `{"raw_response": ...}`.
///
/// # Errors
///
/// Propagates sampling failures; parse failures are not errors.
pub async fn sample_structured(
    ctx: &ToolContext,
    data: &Value,
    output_format: &str,
) -> Result<Value> {
    let pretty = serde_json::to_string_pretty(data)?;
    let prompt = format!(
        "Analyze the following data and return results in {output_format} format:\n\n\
         Data: {pretty}\n\n\
         Please structure your response as valid {output_format}."
    );
    let text = ctx
        .sample(
            SamplingRequest::user(prompt)
                .with_temperature(0.2)
                .with_max_tokens(2000),
        )
        .await?;
    Ok(parse_structured(&text))
}

fn parse_structured(text: &str) -> Value {
    let trimmed = strip_code_fence(text.trim());
    serde_json::from_str(trimmed).unwrap_or_else(|_| json!({ "raw_response": text }))
}

/// Models like wrapping JSON in a ```json fence.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Completion over a prior conversation.
///
/// # Errors
///
/// Propagates sampling failures.
pub async fn sample_multi_turn(
    ctx: &ToolContext,
    conversation: Vec<(Role, String)>,
) -> Result<String> {
    let request = SamplingRequest {
        messages: conversation,
        system_prompt: None,
        temperature: Some(0.7),
        max_tokens: 1500,
    };
    ctx.sample(request).await
}

/// Retry a prompt up to `attempts` times, sleeping `2^attempt` seconds between failures.
///
/// # Errors
///
/// Returns the last sampling error once every attempt has failed.
pub async fn sample_with_retry(ctx: &ToolContext, prompt: &str, attempts: u32) -> Result<String> {
    sample_with_retry_backoff(ctx, prompt, attempts, Duration::from_secs(1)).await
}

async fn sample_with_retry_backoff(
    ctx: &ToolContext,
    prompt: &str,
    attempts: u32,
    unit: Duration,
) -> Result<String> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        ctx.debug(&format!("Sampling attempt {}/{attempts}", attempt + 1))
            .await;
        let request = SamplingRequest::user(prompt)
            .with_temperature(0.5)
            .with_max_tokens(1000);
        match ctx.sample(request).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                ctx.error(&format!("Sampling attempt {} failed: {e}", attempt + 1))
                    .await;
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(unit * 2u32.pow(attempt)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ServerError::Sampling("no attempts made".to_string())))
}

/// Analyze each item concurrently. Items whose sampling fails are dropped from the output.
pub async fn parallel_analysis(ctx: &ToolContext, items: &[Value]) -> Vec<Value> {
    let tasks = items.iter().enumerate().map(|(i, item)| async move {
        let text = match item.get("text").and_then(Value::as_str) {
            Some(t) => t.to_string(),
            None => item.to_string(),
        };
        let prompt = format!("Analyze this content and extract key points:\n\n{text}");
        let analysis = sample_basic(ctx, &prompt, 0.3, 500).await;
        let id = item.get("id").cloned().unwrap_or_else(|| json!(i));
        match analysis {
            Ok(analysis) => Some(json!({
                "id": id,
                "analysis": analysis,
                "timestamp": crate::timestamp(),
            })),
            Err(e) => {
                tracing::warn!(item = %id, error = %e, "parallel analysis item failed");
                None
            }
        }
    });
    join_all(tasks).await.into_iter().flatten().collect()
}

/// Run `primary`; on failure log it and run `fallback`.
///
/// # Errors
///
/// Returns the fallback's error when both fail.
pub async fn with_fallback<T, P, F>(ctx: &ToolContext, primary: P, fallback: F) -> Result<T>
where
    P: Future<Output = Result<T>>,
    F: Future<Output = Result<T>>,
{
    match primary.await {
        Ok(v) => Ok(v),
        Err(e) => {
            ctx.info(&format!("Primary operation failed: {e}, trying fallback"))
                .await;
            fallback.await
        }
    }
}

// ============================================================================
// Pipelines
// ============================================================================

/// Results of the steps run so far, keyed by step name.
pub type StepResults = HashMap<String, Value>;

type StepFn = Box<dyn for<'a> Fn(&'a StepResults) -> BoxFuture<'a, Result<Value>> + Send + Sync>;
type Predicate = Box<dyn Fn(&StepResults) -> bool + Send + Sync>;

struct Step {
    name: String,
    run: StepFn,
    condition: Option<Predicate>,
}

/// Named async steps run in order. Each step sees the results of the steps before it.
///
/// Steps given a condition via [`Pipeline::add_conditional_step`] are skipped when the predicate
/// is false over the results so far; skipped steps leave no entry in the results.
pub struct Pipeline {
    name: String,
    steps: Vec<Step>,
}

/// Pipeline whose steps may be guarded by predicates.
pub type ConditionalPipeline = Pipeline;

impl Pipeline {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_step<F>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: for<'a> Fn(&'a StepResults) -> BoxFuture<'a, Result<Value>> + Send + Sync + 'static,
    {
        self.steps.push(Step {
            name: name.into(),
            run: Box::new(run),
            condition: None,
        });
        self
    }

    #[must_use]
    pub fn add_conditional_step<F, C>(mut self, name: impl Into<String>, condition: C, run: F) -> Self
    where
        F: for<'a> Fn(&'a StepResults) -> BoxFuture<'a, Result<Value>> + Send + Sync + 'static,
        C: Fn(&StepResults) -> bool + Send + Sync + 'static,
    {
        self.steps.push(Step {
            name: name.into(),
            run: Box::new(run),
            condition: Some(Box::new(condition)),
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// # Errors
    ///
    /// Returns [`ServerError::Step`] naming the first step that failed.
    pub async fn execute(&self, ctx: &ToolContext) -> Result<StepResults> {
        ctx.info(&format!("Starting pipeline: {}", self.name)).await;
        let total = self.steps.len() as f64;
        let mut results = StepResults::new();

        for (i, step) in self.steps.iter().enumerate() {
            if let Some(condition) = &step.condition
                && !condition(&results)
            {
                ctx.debug(&format!("Skipping step {} (condition not met)", step.name))
                    .await;
                continue;
            }

            ctx.report_progress(i as f64, total).await;
            ctx.info(&format!("Executing step: {}", step.name)).await;

            let outcome = (step.run)(&results).await;
            match outcome {
                Ok(value) => {
                    results.insert(step.name.clone(), value);
                }
                Err(e) => {
                    ctx.error(&format!("Step {} failed: {e}", step.name)).await;
                    return Err(ServerError::Step {
                        step: step.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        ctx.report_progress(total, total).await;
        ctx.info(&format!("Pipeline {} completed", self.name)).await;
        Ok(results)
    }
}

// ============================================================================
// Cache
// ============================================================================

/// String-keyed TTL cache for intermediate step results.
#[derive(Clone)]
pub struct StepCache {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, (Value, Instant)>>>,
}

impl Default for StepCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl StepCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cached value, if present and fresh. Expired entries are removed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, at)) if at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.lock().insert(key.into(), (value, Instant::now()));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
