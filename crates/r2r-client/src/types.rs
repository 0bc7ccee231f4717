//! Request and response models for the R2R v3 API.
//!
//! R2R is loose about response shapes across versions, so every model keeps the fields it does
//! not name in `extra` and serializes them back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_RAG_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_LIST_LIMIT: u32 = 100;

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    #[default]
    Vanilla,
    Hyde,
    RagFusion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_hybrid_search: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_semantic_search: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_fulltext_search: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_strategy: Option<SearchStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_settings: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchSettings {
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Fill unset fields with the search defaults: limit 10, hybrid search, vanilla strategy.
    #[must_use]
    pub fn with_search_defaults(mut self) -> Self {
        self.limit.get_or_insert(DEFAULT_SEARCH_LIMIT);
        self.use_hybrid_search.get_or_insert(true);
        self.search_strategy.get_or_insert(SearchStrategy::Vanilla);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub search_settings: SearchSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagGenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_citations: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RagGenerationConfig {
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Fill unset fields with the RAG defaults: 4000 tokens, temperature 0.1, citations on.
    #[must_use]
    pub fn with_rag_defaults(mut self) -> Self {
        self.max_tokens.get_or_insert(DEFAULT_MAX_TOKENS);
        self.temperature.get_or_insert(DEFAULT_RAG_TEMPERATURE);
        self.include_citations.get_or_insert(true);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagRequest {
    pub query: String,
    pub rag_generation_config: RagGenerationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_settings: Option<SearchSettings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
}

impl AgentMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

impl From<&str> for AgentMessage {
    fn from(content: &str) -> Self {
        Self::user(content)
    }
}

impl From<String> for AgentMessage {
    fn from(content: String) -> Self {
        Self::user(content)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Rag,
    #[default]
    Research,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<AgentMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<AgentMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AgentMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_tools: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentRequest {
    /// A request for a single message; a bare string becomes a user message.
    #[must_use]
    pub fn new(message: impl Into<AgentMessage>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Fill unset fields with the agent defaults: research mode, 4000 tokens, no streaming.
    #[must_use]
    pub fn with_agent_defaults(mut self) -> Self {
        self.mode.get_or_insert(AgentMode::Research);
        self.max_tokens.get_or_insert(DEFAULT_MAX_TOKENS);
        self.stream.get_or_insert(false);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentMetadata {
    /// Set an arbitrary top-level metadata field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// What to ingest: a local file (uploaded as multipart) or raw text (sent as JSON).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    File(PathBuf),
    Content(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

// ============================================================================
// Responses
// ============================================================================

/// The `{"results": ...}` wrapper R2R puts around most responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub results: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_entries: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub chunk_search_results: Vec<ChunkResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: SearchResults,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchResponse {
    #[must_use]
    pub fn chunks(&self) -> &[ChunkResult] {
        &self.results.chunk_search_results
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_answer: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<SearchResults>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// RAG response. Newer R2R versions nest everything under `results`; older ones answer at the
/// top level. The accessors look in both places.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<RagResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<SearchResponse>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RagResponse {
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.results
            .as_ref()
            .and_then(|r| r.generated_answer.as_deref())
            .or(self.answer.as_deref())
    }

    #[must_use]
    pub fn citations(&self) -> &[Citation] {
        match &self.results {
            Some(r) if !r.citations.is_empty() => &r.citations,
            _ => &self.citations,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentResponse {
    #[serde(default, alias = "document_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionResponse {
    #[serde(default, alias = "collection_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
