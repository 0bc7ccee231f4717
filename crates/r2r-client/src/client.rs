use crate::error::{R2rError, Result};
use crate::types::{
    AgentRequest, AgentResponse, CollectionRequest, CollectionResponse, DEFAULT_LIST_LIMIT,
    DocumentMetadata, DocumentResponse, DocumentSource, Envelope, RagGenerationConfig, RagRequest,
    RagResponse, SearchRequest, SearchResponse, SearchSettings,
};
use r2r_mcp_http_tools::client::{DEFAULT_TIMEOUT, build_client, expect_success};
use r2r_mcp_http_tools::{CredentialResolver, HttpMethod, HttpToolsError};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use url::Url;

/// Typed access to the R2R API.
///
/// Every request resolves the API key through the [`CredentialResolver`] right before it is
/// sent, so a key that appears (or rotates) after construction is picked up.
#[derive(Clone, Debug)]
pub struct R2rClient {
    base_url: String,
    http: Client,
    credentials: CredentialResolver,
}

impl R2rClient {
    /// Client with its own HTTP connection pool and the default 30 s timeout.
    ///
    /// # Errors
    ///
    /// Returns an error for a base URL that is not an absolute http(s) URL.
    pub fn new(base_url: &str, credentials: CredentialResolver) -> Result<Self> {
        let http = build_client(Some(DEFAULT_TIMEOUT))?;
        Self::with_client(base_url, http, credentials)
    }

    /// Client sharing an existing `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns an error for a base URL that is not an absolute http(s) URL.
    pub fn with_client(
        base_url: &str,
        http: Client,
        credentials: CredentialResolver,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| R2rError::InvalidInput(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(R2rError::InvalidInput(format!(
                "base URL '{base_url}' must use http or https"
            )));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            credentials,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = self.credentials.apply(request);
        let response = request.send().await.map_err(HttpToolsError::from)?;
        let body = expect_success(response).await?;
        Ok(serde_json::from_value(body.into_value())?)
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// `POST /v3/retrieval/search`. Unset settings default to limit 10, hybrid search and the
    /// vanilla strategy.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses or unexpected bodies.
    pub async fn search(&self, query: &str, settings: SearchSettings) -> Result<SearchResponse> {
        self.search_exact(query, settings.with_search_defaults()).await
    }

    /// `POST /v3/retrieval/search` with `settings` sent exactly as given; R2R applies its own
    /// defaults to anything unset.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses or unexpected bodies.
    pub async fn search_exact(
        &self,
        query: &str,
        settings: SearchSettings,
    ) -> Result<SearchResponse> {
        let payload = SearchRequest {
            query: query.to_string(),
            search_settings: settings,
        };
        tracing::debug!(query, limit = ?payload.search_settings.limit, "R2R search");
        self.send(self.http.post(self.url("/v3/retrieval/search")).json(&payload))
            .await
    }

    /// `POST /v3/retrieval/rag`. Unset generation settings default to 4000 tokens, temperature
    /// 0.1 and citations on.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses or unexpected bodies.
    pub async fn rag(
        &self,
        query: &str,
        config: RagGenerationConfig,
        search_limit: Option<u32>,
    ) -> Result<RagResponse> {
        let config = config.with_rag_defaults();
        if config.stream == Some(true) {
            return Err(R2rError::InvalidInput(
                "streaming RAG responses are not supported".to_string(),
            ));
        }
        let payload = RagRequest {
            query: query.to_string(),
            rag_generation_config: config,
            search_settings: search_limit.map(|limit| SearchSettings::default().with_limit(limit)),
        };
        tracing::debug!(query, "R2R rag");
        self.send(self.http.post(self.url("/v3/retrieval/rag")).json(&payload))
            .await
    }

    /// `POST /v3/retrieval/agent`. Unset fields default to research mode, 4000 tokens and no
    /// streaming.
    ///
    /// # Errors
    ///
    /// Returns an error for streaming requests, requests without a message, transport failures,
    /// non-2xx responses or unexpected bodies.
    pub async fn agent(&self, request: AgentRequest) -> Result<AgentResponse> {
        let request = request.with_agent_defaults();
        if request.stream == Some(true) {
            return Err(R2rError::InvalidInput(
                "streaming agent responses are not supported".to_string(),
            ));
        }
        if request.message.is_none() && request.messages.as_ref().is_none_or(Vec::is_empty) {
            return Err(R2rError::InvalidInput(
                "agent request needs a message".to_string(),
            ));
        }
        self.send(self.http.post(self.url("/v3/retrieval/agent")).json(&request))
            .await
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// `POST /v3/documents`: multipart upload for files, JSON for raw content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the content is empty, or the request fails.
    pub async fn create_document(
        &self,
        source: DocumentSource,
        metadata: Option<DocumentMetadata>,
        collection_ids: &[String],
    ) -> Result<Envelope<DocumentResponse>> {
        let request = match source {
            DocumentSource::File(path) => {
                let bytes = tokio::fs::read(&path).await.map_err(|source| R2rError::Io {
                    path: path.clone(),
                    source,
                })?;
                let file_name = path
                    .file_name()
                    .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
                tracing::debug!(file = %path.display(), bytes = bytes.len(), "uploading document");

                let mut form = reqwest::multipart::Form::new().part(
                    "file",
                    reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                );
                if let Some(metadata) = &metadata {
                    form = form.text("metadata", serde_json::to_string(metadata)?);
                }
                if !collection_ids.is_empty() {
                    form = form.text("collection_ids", serde_json::to_string(collection_ids)?);
                }
                self.http.post(self.url("/v3/documents")).multipart(form)
            }
            DocumentSource::Content(content) => {
                if content.is_empty() {
                    return Err(R2rError::InvalidInput(
                        "either a file or non-empty content must be provided".to_string(),
                    ));
                }
                let mut payload = Map::new();
                payload.insert("content".into(), Value::String(content));
                if let Some(metadata) = &metadata {
                    payload.insert("metadata".into(), serde_json::to_value(metadata)?);
                }
                if !collection_ids.is_empty() {
                    payload.insert("collection_ids".into(), json!(collection_ids));
                }
                self.http.post(self.url("/v3/documents")).json(&payload)
            }
        };
        self.send(request).await
    }

    /// `GET /v3/documents/{id}`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses or unexpected bodies.
    pub async fn get_document(&self, document_id: &str) -> Result<Envelope<DocumentResponse>> {
        let path = format!("/v3/documents/{}", urlencoding::encode(document_id));
        self.send(self.http.get(self.url(&path))).await
    }

    /// `DELETE /v3/documents/{id}`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or non-2xx responses.
    pub async fn delete_document(&self, document_id: &str) -> Result<Value> {
        let path = format!("/v3/documents/{}", urlencoding::encode(document_id));
        self.send(self.http.delete(self.url(&path))).await
    }

    /// `GET /v3/documents?limit=&offset=`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses or unexpected bodies.
    pub async fn list_documents(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Envelope<Vec<DocumentResponse>>> {
        let query = page(limit, offset);
        self.send(self.http.get(self.url("/v3/documents")).query(&query))
            .await
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// `POST /v3/collections`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name, transport failures, non-2xx responses or unexpected
    /// bodies.
    pub async fn create_collection(
        &self,
        request: CollectionRequest,
    ) -> Result<Envelope<CollectionResponse>> {
        if request.name.trim().is_empty() {
            return Err(R2rError::InvalidInput(
                "collection name must not be empty".to_string(),
            ));
        }
        self.send(self.http.post(self.url("/v3/collections")).json(&request))
            .await
    }

    /// `GET /v3/collections?limit=&offset=`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses or unexpected bodies.
    pub async fn list_collections(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Envelope<Vec<CollectionResponse>>> {
        let query = page(limit, offset);
        self.send(self.http.get(self.url("/v3/collections")).query(&query))
            .await
    }

    /// `GET /v3/collections/{id}`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses or unexpected bodies.
    pub async fn get_collection(&self, collection_id: &str) -> Result<Envelope<CollectionResponse>> {
        let path = format!("/v3/collections/{}", urlencoding::encode(collection_id));
        self.send(self.http.get(self.url(&path))).await
    }

    /// `GET /v3/collections/{id}/documents`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses or unexpected bodies.
    pub async fn list_collection_documents(
        &self,
        collection_id: &str,
    ) -> Result<Envelope<Vec<DocumentResponse>>> {
        let path = format!(
            "/v3/collections/{}/documents",
            urlencoding::encode(collection_id)
        );
        self.send(self.http.get(self.url(&path))).await
    }

    /// `POST /v3/collections/{id}/documents/{document_id}`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or non-2xx responses.
    pub async fn add_document_to_collection(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value> {
        let path = format!(
            "/v3/collections/{}/documents/{}",
            urlencoding::encode(collection_id),
            urlencoding::encode(document_id)
        );
        self.send(self.http.post(self.url(&path))).await
    }

    // ========================================================================
    // Utility
    // ========================================================================

    /// `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or non-2xx responses.
    pub async fn health(&self) -> Result<Value> {
        self.send(self.http.get(self.url("/health"))).await
    }

    /// Low-level request for endpoints without a typed wrapper.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or non-2xx responses.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Result<Value> {
        let mut request = self.http.request(method.to_reqwest(), self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }
}

fn page(limit: Option<u32>, offset: Option<u32>) -> [(&'static str, u32); 2] {
    [
        ("limit", limit.unwrap_or(DEFAULT_LIST_LIMIT)),
        ("offset", offset.unwrap_or(0)),
    ]
}
