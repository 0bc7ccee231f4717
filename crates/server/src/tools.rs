//! Hand-written "enhanced" tools: search with progress, sampled analysis and research pipelines.
//!
//! Invalid arguments are protocol errors (`invalid_params`). Failures talking to R2R or to the
//! client's LLM come back as tool results with `is_error` set, so the model can see them.

use crate::context::{SamplingRequest, ToolContext};
use crate::error::{Result, ServerError};
use crate::pipelines::{Pipeline, StepCache, StepResults, sample_structured, with_fallback};
use futures::FutureExt as _;
use r2r_mcp_client::{ChunkResult, R2rClient, SearchResponse, SearchSettings, format_search_results};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

pub const ENHANCED_SEARCH: &str = "enhanced_search";
pub const ANALYZE_SEARCH_RESULTS: &str = "analyze_search_results";
pub const RESEARCH_PIPELINE: &str = "research_pipeline";
pub const COMPARATIVE_ANALYSIS: &str = "comparative_analysis";
pub const EXTRACT_STRUCTURED_DATA: &str = "extract_structured_data";
pub const GENERATE_FOLLOWUP_QUESTIONS: &str = "generate_followup_questions";

const ALL: [&str; 6] = [
    ENHANCED_SEARCH,
    ANALYZE_SEARCH_RESULTS,
    RESEARCH_PIPELINE,
    COMPARATIVE_ANALYSIS,
    EXTRACT_STRUCTURED_DATA,
    GENERATE_FOLLOWUP_QUESTIONS,
];

const MAX_FOLLOWUP_QUESTIONS: u32 = 10;
const EXCERPT_CHARS: usize = 200;

#[must_use]
pub fn is_enhanced(name: &str) -> bool {
    ALL.contains(&name)
}

// ============================================================================
// Definitions
// ============================================================================

fn schema(value: Value) -> Arc<JsonObject> {
    Arc::new(value.as_object().cloned().unwrap_or_default())
}

fn tool(name: &str, title: &str, description: &str, input: Value, read_only: bool) -> Tool {
    let mut tool = Tool::new(name.to_string(), description.to_string(), schema(input));
    tool.annotations = Some(ToolAnnotations {
        title: Some(title.to_string()),
        read_only_hint: Some(read_only),
        destructive_hint: Some(false),
        idempotent_hint: Some(read_only),
        open_world_hint: Some(true),
    });
    tool
}

#[must_use]
pub fn list_tools() -> Vec<Tool> {
    vec![
        tool(
            ENHANCED_SEARCH,
            "Enhanced search",
            "Search R2R knowledge base with progress reporting",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "limit": {"type": "integer", "minimum": 1, "default": 10},
                    "search_type": {
                        "type": "string",
                        "enum": ["hybrid", "semantic", "fulltext"],
                        "default": "hybrid"
                    }
                },
                "required": ["query"]
            }),
            true,
        ),
        tool(
            ANALYZE_SEARCH_RESULTS,
            "Analyze search results",
            "Analyze R2R search results using LLM sampling",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "default": 5}
                },
                "required": ["query"]
            }),
            false,
        ),
        tool(
            RESEARCH_PIPELINE,
            "Research pipeline",
            "Multi-step research pipeline: search, analyze, summarize",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Research question or topic"},
                    "analysis_depth": {
                        "type": "string",
                        "enum": ["quick", "standard", "deep"],
                        "default": "standard"
                    }
                },
                "required": ["query"]
            }),
            false,
        ),
        tool(
            COMPARATIVE_ANALYSIS,
            "Comparative analysis",
            "Comparative analysis of multiple queries using LLM sampling",
            json!({
                "type": "object",
                "properties": {
                    "queries": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 2,
                        "maxItems": 5
                    },
                    "comparison_criteria": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["queries"]
            }),
            false,
        ),
        tool(
            EXTRACT_STRUCTURED_DATA,
            "Extract structured data",
            "Extract structured data from documents using LLM sampling",
            json!({
                "type": "object",
                "properties": {
                    "document_id": {"type": "string"},
                    "schema": {
                        "type": "object",
                        "description": "Shape of the desired output, e.g. {\"title\": \"string\"}"
                    }
                },
                "required": ["document_id", "schema"]
            }),
            false,
        ),
        tool(
            GENERATE_FOLLOWUP_QUESTIONS,
            "Generate follow-up questions",
            "Generate follow-up questions based on search results",
            json!({
                "type": "object",
                "properties": {
                    "initial_query": {"type": "string"},
                    "num_questions": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_FOLLOWUP_QUESTIONS,
                        "default": 5
                    }
                },
                "required": ["initial_query"]
            }),
            false,
        ),
    ]
}

// ============================================================================
// Dispatch
// ============================================================================

fn parse_args<T: DeserializeOwned>(name: &str, arguments: Option<JsonObject>) -> Result<T> {
    let value = Value::Object(arguments.unwrap_or_default());
    serde_json::from_value(value)
        .map_err(|e| ServerError::InvalidArguments(format!("{name}: {e}")))
}

fn json_content(value: &Value) -> Result<CallToolResult> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value)?,
    )]))
}

fn tool_error(message: String) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message)])
}

/// Run an enhanced tool.
///
/// # Errors
///
/// Returns [`ServerError::InvalidArguments`] for unknown tools or arguments that do not fit the
/// tool's schema.
pub async fn call(
    client: &R2rClient,
    cache: &StepCache,
    ctx: &ToolContext,
    name: &str,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult> {
    let outcome = match name {
        ENHANCED_SEARCH => enhanced_search(client, ctx, parse_args(name, arguments)?).await,
        ANALYZE_SEARCH_RESULTS => analyze_search_results(client, ctx, parse_args(name, arguments)?).await,
        RESEARCH_PIPELINE => {
            research_pipeline(client, cache, ctx, parse_args(name, arguments)?).await
        }
        COMPARATIVE_ANALYSIS => comparative_analysis(client, ctx, parse_args(name, arguments)?).await,
        EXTRACT_STRUCTURED_DATA => extract_structured_data(client, ctx, parse_args(name, arguments)?).await,
        GENERATE_FOLLOWUP_QUESTIONS => {
            generate_followup_questions(ctx, parse_args(name, arguments)?).await
        }
        other => {
            return Err(ServerError::InvalidArguments(format!(
                "unknown tool: {other}"
            )));
        }
    };

    match outcome {
        Ok(value) => json_content(&value),
        Err(e) if e.is_invalid_input() => Err(e),
        Err(e) => {
            ctx.error(&format!("{name} failed: {e}")).await;
            Ok(tool_error(e.to_string()))
        }
    }
}

// ============================================================================
// Tools
// ============================================================================

fn default_search_limit() -> u32 {
    10
}

fn default_analysis_limit() -> u32 {
    5
}

fn default_search_type() -> String {
    "hybrid".to_string()
}

fn default_depth() -> String {
    "standard".to_string()
}

fn default_num_questions() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
struct EnhancedSearchArgs {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: u32,
    #[serde(default = "default_search_type")]
    search_type: String,
}

async fn enhanced_search(
    client: &R2rClient,
    ctx: &ToolContext,
    args: EnhancedSearchArgs,
) -> Result<Value> {
    ctx.info(&format!("Starting enhanced search for: {}", args.query))
        .await;
    ctx.report_progress(0.0, 100.0).await;

    let settings = SearchSettings {
        limit: Some(args.limit),
        use_hybrid_search: Some(args.search_type == "hybrid"),
        use_semantic_search: Some(matches!(args.search_type.as_str(), "semantic" | "hybrid")),
        ..SearchSettings::default()
    };
    ctx.report_progress(30.0, 100.0).await;

    let results = client.search(&args.query, settings).await?;
    ctx.report_progress(80.0, 100.0).await;

    let result_count = results.chunks().len();
    ctx.info(&format!("Found {result_count} results")).await;
    ctx.report_progress(100.0, 100.0).await;

    Ok(json!({
        "query": args.query,
        "search_type": args.search_type,
        "result_count": result_count,
        "results": results,
        "timestamp": crate::timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    query: String,
    #[serde(default = "default_analysis_limit")]
    limit: u32,
}

fn excerpt(text: &str) -> String {
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{cut}...")
}

fn numbered_results(chunks: &[ChunkResult], shorten: bool) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let text = if shorten { excerpt(&c.text) } else { c.text.clone() };
            format!("Result {}: {text}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn analyze_search_results(
    client: &R2rClient,
    ctx: &ToolContext,
    args: AnalyzeArgs,
) -> Result<Value> {
    ctx.info(&format!("Analyzing search results for: {}", args.query))
        .await;
    let settings = SearchSettings::default().with_limit(args.limit);
    let results = client.search(&args.query, settings).await?;
    let chunks = results.chunks();
    if chunks.is_empty() {
        return Ok(json!({"analysis": "No results found", "query": args.query}));
    }

    let shown = &chunks[..chunks.len().min(5)];
    let prompt = format!(
        "Analyze these search results for the query: \"{}\"\n\n\
         Results:\n{}\n\n\
         Provide:\n\
         1. Key themes and patterns\n\
         2. Relevance assessment\n\
         3. Suggested follow-up questions\n",
        args.query,
        numbered_results(shown, true)
    );
    let analysis = ctx
        .sample(
            SamplingRequest::user(prompt)
                .with_system("You are an expert data analyst. Provide concise, structured analysis.")
                .with_temperature(0.3)
                .with_max_tokens(500),
        )
        .await?;

    Ok(json!({
        "query": args.query,
        "result_count": chunks.len(),
        "analysis": analysis,
        "timestamp": crate::timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct ResearchArgs {
    query: String,
    #[serde(default = "default_depth")]
    analysis_depth: String,
}

/// Search limit and analysis token budget per depth; unknown depths use `standard`.
fn depth_config(depth: &str) -> (u32, u32) {
    match depth {
        "quick" => (5, 500),
        "deep" => (20, 2000),
        _ => (10, 1000),
    }
}

fn chunks_of(step: Option<&Value>) -> Vec<ChunkResult> {
    step.cloned()
        .and_then(|v| serde_json::from_value::<SearchResponse>(v).ok())
        .map(|r| r.results.chunk_search_results)
        .unwrap_or_default()
}

fn has_analysis(results: &StepResults) -> bool {
    results
        .get("analyze")
        .and_then(Value::as_str)
        .is_some_and(|a| !a.trim().is_empty())
}

/// Search, analyze, then summarize the analysis.
///
/// Search results are cached per query and limit. The summary step is skipped when the analysis
/// came back empty, and falls back to an excerpt of the analysis when sampling it fails.
async fn research_pipeline(
    client: &R2rClient,
    cache: &StepCache,
    ctx: &ToolContext,
    args: ResearchArgs,
) -> Result<Value> {
    ctx.info(&format!("Starting research pipeline: {}", args.query))
        .await;
    ctx.info(&format!("Analysis depth: {}", args.analysis_depth))
        .await;
    let (search_limit, max_tokens) = depth_config(&args.analysis_depth);

    let (search_client, search_cache) = (client.clone(), cache.clone());
    let (search_ctx, search_query) = (ctx.clone(), args.query.clone());
    let (analyze_ctx, analyze_query) = (ctx.clone(), args.query.clone());
    let summarize_ctx = ctx.clone();

    let pipeline = Pipeline::new("research")
        .add_step("search", move |_| {
            let (client, cache) = (search_client.clone(), search_cache.clone());
            let (ctx, query) = (search_ctx.clone(), search_query.clone());
            async move {
                let key = format!("search:{search_limit}:{query}");
                if let Some(cached) = cache.get(&key) {
                    ctx.debug("Using cached search results").await;
                    return Ok(cached);
                }
                let settings = SearchSettings::default().with_limit(search_limit);
                let results = serde_json::to_value(client.search(&query, settings).await?)?;
                cache.set(key, results.clone());
                Ok::<_, ServerError>(results)
            }
            .boxed()
        })
        .add_step("analyze", move |results| {
            let chunks = chunks_of(results.get("search"));
            let prompt = format!(
                "Analyze the following search results and provide:\n\
                 1. Key themes and patterns\n\
                 2. Main insights\n\
                 3. Recommended follow-up questions\n\n\
                 Search Query: {analyze_query}\n\n\
                 Results:\n{}\n\n\
                 Please provide a structured analysis.",
                numbered_results(&chunks, false)
            );
            let ctx = analyze_ctx.clone();
            async move {
                let analysis = ctx
                    .sample(
                        SamplingRequest::user(prompt)
                            .with_system(
                                "You are an expert data analyst specializing in information synthesis.",
                            )
                            .with_temperature(0.4)
                            .with_max_tokens(max_tokens),
                    )
                    .await?;
                Ok::<_, ServerError>(Value::String(analysis))
            }
            .boxed()
        })
        .add_conditional_step("summarize", has_analysis, move |results| {
            let analysis = results
                .get("analyze")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let ctx = summarize_ctx.clone();
            async move {
                let prompt = format!(
                    "Create a concise executive summary (2-3 sentences) of this analysis:\n\n\
                     {analysis}\n\n\
                     Focus on the most important insights and actionable recommendations."
                );
                let sampled = ctx.sample(
                    SamplingRequest::user(prompt)
                        .with_temperature(0.3)
                        .with_max_tokens(300),
                );
                let excerpted = async { Ok::<_, ServerError>(excerpt(&analysis)) };
                let summary = with_fallback(&ctx, sampled, excerpted).await?;
                Ok::<_, ServerError>(Value::String(summary))
            }
            .boxed()
        });

    let results = pipeline.execute(ctx).await?;
    ctx.info("Research pipeline complete").await;

    Ok(json!({
        "query": args.query,
        "analysis_depth": args.analysis_depth,
        "summary": results.get("summarize"),
        "full_analysis": results.get("analyze"),
        "search_results_count": chunks_of(results.get("search")).len(),
        "timestamp": crate::timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct CompareArgs {
    queries: Vec<String>,
    #[serde(default)]
    comparison_criteria: Option<Vec<String>>,
}

async fn comparative_analysis(
    client: &R2rClient,
    ctx: &ToolContext,
    args: CompareArgs,
) -> Result<Value> {
    let n = args.queries.len();
    if n < 2 {
        return Ok(json!({"error": "At least 2 queries required for comparison"}));
    }
    if n > 5 {
        return Ok(json!({"error": "Maximum 5 queries allowed"}));
    }

    ctx.info(&format!("Comparative analysis of {n} queries")).await;
    let total = (n + 1) as f64;
    ctx.report_progress(0.0, total).await;

    let mut sections = Vec::with_capacity(n);
    for (i, query) in args.queries.iter().enumerate() {
        ctx.info(&format!("Searching: {query}")).await;
        let results = client
            .search(query, SearchSettings::default().with_limit(5))
            .await?;
        sections.push(format!(
            "Query {}: {query}\nResults: {}",
            i + 1,
            format_search_results(&results, Some(5))
        ));
        ctx.report_progress((i + 1) as f64, total).await;
    }

    let criteria = args
        .comparison_criteria
        .as_ref()
        .filter(|c| !c.is_empty())
        .map(|c| format!("\n\nComparison Criteria: {}", c.join(", ")))
        .unwrap_or_default();
    let prompt = format!(
        "Compare the following search queries and their results:\n\n\
         {}{criteria}\n\n\
         Provide a structured comparison including:\n\
         1. Key similarities and differences\n\
         2. Strengths and limitations of each\n\
         3. Best use cases for each\n\
         4. Overall recommendation",
        sections.join("\n\n")
    );

    ctx.info("Generating comparative analysis").await;
    let comparison = ctx
        .sample(
            SamplingRequest::user(prompt)
                .with_system(
                    "You are an expert analyst specializing in comparative analysis and synthesis.",
                )
                .with_temperature(0.4)
                .with_max_tokens(2000),
        )
        .await?;
    ctx.report_progress(total, total).await;

    Ok(json!({
        "queries": args.queries,
        "comparison": comparison,
        "criteria": args.comparison_criteria,
        "timestamp": crate::timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct ExtractArgs {
    document_id: String,
    schema: Value,
}

async fn extract_structured_data(
    client: &R2rClient,
    ctx: &ToolContext,
    args: ExtractArgs,
) -> Result<Value> {
    ctx.info(&format!(
        "Extracting structured data from document {}",
        args.document_id
    ))
    .await;
    let document = client.get_document(&args.document_id).await?;

    ctx.info("Analyzing document with schema").await;
    let data = json!({
        "document_id": args.document_id,
        "content": document.results,
        "schema": args.schema,
    });
    let extracted = sample_structured(ctx, &data, "json").await?;
    ctx.info("Extraction complete").await;

    Ok(json!({
        "document_id": args.document_id,
        "schema": args.schema,
        "extracted_data": extracted,
        "timestamp": crate::timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct FollowupArgs {
    initial_query: String,
    #[serde(default = "default_num_questions")]
    num_questions: u32,
}

/// Lines of a numbered list (`1.` through `19.`), trimmed.
fn numbered_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            let digits: String = line.chars().take_while(char::is_ascii_digit).collect();
            let Ok(n) = digits.parse::<u32>() else {
                return false;
            };
            (1..20).contains(&n) && line[digits.len()..].starts_with('.')
        })
        .map(str::to_string)
        .collect()
}

async fn generate_followup_questions(ctx: &ToolContext, args: FollowupArgs) -> Result<Value> {
    let n = args.num_questions.clamp(1, MAX_FOLLOWUP_QUESTIONS);
    ctx.info(&format!(
        "Generating {n} follow-up questions for: {}",
        args.initial_query
    ))
    .await;

    let prompt = format!(
        "Based on the query: \"{}\"\n\n\
         Generate {n} insightful follow-up questions that would help explore this topic more deeply.\n\n\
         Questions should:\n\
         1. Build on the initial query\n\
         2. Cover different aspects (technical, practical, comparative, etc.)\n\
         3. Be specific and answerable\n\
         4. Progress from basic to advanced\n\n\
         Format as a numbered list.",
        args.initial_query
    );
    let text = ctx
        .sample(
            SamplingRequest::user(prompt)
                .with_system(
                    "You are an expert at generating insightful questions for research and exploration.",
                )
                .with_temperature(0.7)
                .with_max_tokens(800),
        )
        .await?;
    let questions = numbered_lines(&text);

    Ok(json!({
        "initial_query": args.initial_query,
        "follow_up_questions": questions,
        "count": questions.len(),
        "timestamp": crate::timestamp(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{ScriptedSampler, context};
    use r2r_mcp_env::StaticSettings;
    use r2r_mcp_http_tools::CredentialResolver;
    use r2r_mcp_test_support::MockR2r;

    async fn client() -> (R2rClient, MockR2r) {
        let mock = MockR2r::start().await.expect("mock");
        let creds = CredentialResolver::new(Arc::new(StaticSettings::new()));
        let client = R2rClient::new(mock.base_url(), creds).expect("client");
        (client, mock)
    }

    fn args(v: Value) -> Option<JsonObject> {
        v.as_object().cloned()
    }

    fn body(result: &CallToolResult) -> Value {
        let v = serde_json::to_value(result).expect("json");
        let text = v["content"][0]["text"].as_str().expect("text");
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }

    fn is_error(result: &CallToolResult) -> bool {
        result.is_error.unwrap_or(false)
    }

    #[test]
    fn definitions() {
        let tools = list_tools();
        assert_eq!(tools.len(), 6);
        assert!(tools.iter().all(|t| is_enhanced(&t.name)));
        let search = tools
            .iter()
            .find(|t| t.name == ENHANCED_SEARCH)
            .expect("search");
        assert_eq!(
            search.annotations.as_ref().and_then(|a| a.read_only_hint),
            Some(true)
        );
        assert!(!is_enhanced("get_document"));
    }

    #[test]
    fn numbered_line_extraction() {
        let text = "Here you go:\n1. What?\n  2. Why?\n10. How?\n20. Too far\n3 missing dot\n- bullet";
        assert_eq!(numbered_lines(text), ["1. What?", "2. Why?", "10. How?"]);
    }

    #[test]
    fn depth_falls_back_to_standard() {
        assert_eq!(depth_config("quick"), (5, 500));
        assert_eq!(depth_config("deep"), (20, 2000));
        assert_eq!(depth_config("standard"), (10, 1000));
        assert_eq!(depth_config("exhaustive"), (10, 1000));
    }

    #[tokio::test]
    async fn enhanced_search_reports_progress() {
        let (client, mock) = client().await;
        let cache = StepCache::default();
        let sampler = ScriptedSampler::replying(Vec::<String>::new());
        let (ctx, notifier) = context(&sampler);

        let result = call(
            &client,
            &cache,
            &ctx,
            ENHANCED_SEARCH,
            args(json!({"query": "rag", "search_type": "semantic", "limit": 3})),
        )
        .await
        .expect("call");
        let v = body(&result);
        assert_eq!(v["result_count"], 2);
        assert_eq!(v["search_type"], "semantic");
        let sent = &v["results"]["echo"]["search_settings"];
        assert_eq!(sent["limit"], 3);
        assert_eq!(sent["use_hybrid_search"], false);
        assert_eq!(sent["use_semantic_search"], true);

        let progress: Vec<f64> = notifier.progress.lock().iter().map(|p| p.0).collect();
        assert_eq!(progress, [0.0, 30.0, 80.0, 100.0]);
        assert_eq!(mock.requests_to("/v3/retrieval/search").len(), 1);
    }

    #[tokio::test]
    async fn invalid_arguments_are_protocol_errors() {
        let (client, _mock) = client().await;
        let cache = StepCache::default();
        let ctx = ToolContext::detached();
        let err = call(&client, &cache, &ctx, ENHANCED_SEARCH, args(json!({"limit": 3})))
            .await
            .expect_err("missing query");
        assert!(matches!(err, ServerError::InvalidArguments(_)));
        assert!(call(&client, &cache, &ctx, "nope", None).await.is_err());
    }

    #[tokio::test]
    async fn analyze_handles_empty_and_full_results() {
        let (client, _mock) = client().await;
        let cache = StepCache::default();
        let sampler = ScriptedSampler::replying(["themes"]);
        let (ctx, _) = context(&sampler);

        let v = body(
            &call(&client, &cache, &ctx, ANALYZE_SEARCH_RESULTS, args(json!({"query": "nothing"})))
                .await
                .expect("call"),
        );
        assert_eq!(v["analysis"], "No results found");
        assert!(sampler.requests.lock().is_empty());

        let v = body(
            &call(&client, &cache, &ctx, ANALYZE_SEARCH_RESULTS, args(json!({"query": "graphs"})))
                .await
                .expect("call"),
        );
        assert_eq!(v["analysis"], "themes");
        assert_eq!(v["result_count"], 2);

        let req = sampler.requests.lock()[0].clone();
        assert_eq!(req.temperature, Some(0.3));
        assert_eq!(req.max_tokens, 500);
        assert!(req.messages[0].1.contains("Result 1: First passage about graphs...."));
    }

    #[tokio::test]
    async fn research_pipeline_uses_depth() {
        let (client, _mock) = client().await;
        let cache = StepCache::default();
        let sampler = ScriptedSampler::replying(["full analysis", "short summary"]);
        let (ctx, _) = context(&sampler);

        let v = body(
            &call(
                &client,
                &cache,
                &ctx,
                RESEARCH_PIPELINE,
                args(json!({"query": "vector stores", "analysis_depth": "deep"})),
            )
            .await
            .expect("call"),
        );
        assert_eq!(v["summary"], "short summary");
        assert_eq!(v["full_analysis"], "full analysis");
        assert_eq!(v["search_results_count"], 2);
        assert_eq!(v["analysis_depth"], "deep");

        let reqs = sampler.requests.lock();
        assert_eq!(reqs[0].max_tokens, 2000);
        assert_eq!(reqs[0].temperature, Some(0.4));
        assert!(reqs[0].messages[0].1.contains("Search Query: vector stores"));
        assert!(reqs[1].messages[0].1.contains("full analysis"));
        assert_eq!(reqs[1].max_tokens, 300);
    }

    #[tokio::test]
    async fn research_pipeline_failure_is_a_tool_error() {
        let (client, _mock) = client().await;
        let cache = StepCache::default();
        let sampler = ScriptedSampler::replying(Vec::<String>::new());
        let (ctx, _) = context(&sampler);
        let result = call(&client, &cache, &ctx, RESEARCH_PIPELINE, args(json!({"query": "q"})))
            .await
            .expect("call");
        assert!(is_error(&result));
        assert!(body(&result).as_str().expect("text").contains("analyze"));
    }

    #[tokio::test]
    async fn research_pipeline_caches_search_and_degrades_summary() {
        let (client, mock) = client().await;
        let cache = StepCache::default();
        let sampler = ScriptedSampler::replying(["grounded analysis"]);
        sampler.push_error("model overloaded");
        let (ctx, _) = context(&sampler);
        let research = args(json!({"query": "hybrid search"}));

        let v = body(
            &call(&client, &cache, &ctx, RESEARCH_PIPELINE, research.clone())
                .await
                .expect("call"),
        );
        assert_eq!(v["full_analysis"], "grounded analysis");
        assert_eq!(v["summary"], "grounded analysis...");
        assert_eq!(cache.len(), 1);

        sampler.push_reply("  ");
        let v = body(
            &call(&client, &cache, &ctx, RESEARCH_PIPELINE, research)
                .await
                .expect("call"),
        );
        assert_eq!(v["summary"], Value::Null);
        assert_eq!(v["search_results_count"], 2);
        assert_eq!(sampler.requests.lock().len(), 3);
        assert_eq!(mock.requests_to("/v3/retrieval/search").len(), 1);
    }

    #[tokio::test]
    async fn comparative_analysis_bounds() {
        let (client, _mock) = client().await;
        let cache = StepCache::default();
        let sampler = ScriptedSampler::replying(["compared"]);
        let (ctx, notifier) = context(&sampler);

        let v = body(
            &call(&client, &cache, &ctx, COMPARATIVE_ANALYSIS, args(json!({"queries": ["one"]})))
                .await
                .expect("call"),
        );
        assert_eq!(v["error"], "At least 2 queries required for comparison");

        let v = body(
            &call(
                &client,
                &cache,
                &ctx,
                COMPARATIVE_ANALYSIS,
                args(json!({"queries": ["a", "b", "c", "d", "e", "f"]})),
            )
            .await
            .expect("call"),
        );
        assert_eq!(v["error"], "Maximum 5 queries allowed");

        let v = body(
            &call(
                &client,
                &cache,
                &ctx,
                COMPARATIVE_ANALYSIS,
                args(json!({"queries": ["rag", "fine-tuning"], "comparison_criteria": ["cost"]})),
            )
            .await
            .expect("call"),
        );
        assert_eq!(v["comparison"], "compared");
        assert_eq!(v["criteria"], json!(["cost"]));
        let prompt = sampler.requests.lock()[0].messages[0].1.clone();
        assert!(prompt.contains("Query 2: fine-tuning"));
        assert!(prompt.contains("Comparison Criteria: cost"));
        assert_eq!(notifier.progress.lock().len(), 4);
    }

    #[tokio::test]
    async fn extraction_falls_back_to_raw_response() {
        let (client, _mock) = client().await;
        let cache = StepCache::default();
        let sampler = ScriptedSampler::replying(["{\"title\": \"Document doc-1\"}", "not json"]);
        let (ctx, _) = context(&sampler);

        let schema = json!({"title": "string"});
        let v = body(
            &call(
                &client,
                &cache,
                &ctx,
                EXTRACT_STRUCTURED_DATA,
                args(json!({"document_id": "doc-1", "schema": schema})),
            )
            .await
            .expect("call"),
        );
        assert_eq!(v["extracted_data"]["title"], "Document doc-1");
        assert_eq!(sampler.requests.lock()[0].max_tokens, 2000);

        let v = body(
            &call(
                &client,
                &cache,
                &ctx,
                EXTRACT_STRUCTURED_DATA,
                args(json!({"document_id": "doc-2", "schema": schema})),
            )
            .await
            .expect("call"),
        );
        assert_eq!(v["extracted_data"]["raw_response"], "not json");

        let result = call(
            &client,
            &cache,
            &ctx,
            EXTRACT_STRUCTURED_DATA,
            args(json!({"document_id": "missing", "schema": schema})),
        )
        .await
        .expect("call");
        assert!(is_error(&result));
    }

    #[tokio::test]
    async fn followup_questions_are_capped() {
        let (client, _mock) = client().await;
        let cache = StepCache::default();
        let sampler = ScriptedSampler::replying(["1. A?\n2. B?\nnoise"]);
        let (ctx, _) = context(&sampler);

        let v = body(
            &call(
                &client,
                &cache,
                &ctx,
                GENERATE_FOLLOWUP_QUESTIONS,
                args(json!({"initial_query": "rag", "num_questions": 50})),
            )
            .await
            .expect("call"),
        );
        assert_eq!(v["count"], 2);
        assert_eq!(v["follow_up_questions"], json!(["1. A?", "2. B?"]));

        let req = sampler.requests.lock()[0].clone();
        assert!(req.messages[0].1.contains("Generate 10 insightful"));
        assert_eq!(req.temperature, Some(0.7));
        assert_eq!(req.max_tokens, 800);
    }
}
