//! A small stand-in for an R2R deployment.
//!
//! Serves an `OpenAPI` document at `/openapi.json` covering documents, collections, chunks and
//! retrieval, and answers those routes with canned R2R-shaped payloads. Every request's
//! `Authorization` header is recorded so tests can check credential handling.
//!
//! Conventions: the id `missing` answers 404; the search query `nothing` returns no chunks.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;

/// Paths in [`openapi_document`].
pub const TOTAL_PATHS: usize = 8;

/// A request the mock received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Recorder(Arc<Mutex<Vec<SeenRequest>>>);

/// Running mock with its request log.
#[derive(Debug, Clone)]
pub struct MockR2r {
    base_url: String,
    seen: Recorder,
}

impl MockR2r {
    /// Start the mock on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> anyhow::Result<Self> {
        let seen = Recorder::default();
        let base_url = crate::spawn_router(router(seen.clone())).await?;
        Ok(Self { base_url, seen })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn openapi_url(&self) -> String {
        format!("{}/openapi.json", self.base_url)
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.0.lock().clone()
    }

    /// Requests to `path`, oldest first.
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<SeenRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn record(State(seen): State<Recorder>, req: Request, next: Next) -> Response {
    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    seen.0.lock().push(SeenRequest {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        authorization,
    });
    next.run(req).await
}

fn router(seen: Recorder) -> Router {
    Router::new()
        .route("/openapi.json", get(|| async { Json(openapi_document()) }))
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/v3/health",
            get(|| async { Json(json!({"results": {"message": "ok"}})) }),
        )
        .route("/v3/documents", get(list_documents).post(create_document))
        .route(
            "/v3/documents/{id}",
            get(get_document).delete(delete_document),
        )
        .route("/v3/documents/{id}/chunks", get(document_chunks))
        .route(
            "/v3/collections",
            get(list_collections).post(create_collection),
        )
        .route("/v3/collections/{id}", get(get_collection))
        .route("/v3/collections/{id}/documents", get(collection_documents))
        .route(
            "/v3/collections/{id}/documents/{document_id}",
            post(|| async { Json(json!({"results": {"message": "added"}})) }),
        )
        .route("/v3/retrieval/search", post(search))
        .route("/v3/retrieval/rag", post(rag))
        .layer(middleware::from_fn_with_state(seen.clone(), record))
        .with_state(seen)
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": format!("{what} not found")})),
    )
        .into_response()
}

async fn list_documents() -> Json<Value> {
    Json(json!({
        "results": [
            {"id": "doc-1", "title": "Intro to R2R"},
            {"id": "doc-2", "title": "Retrieval notes"}
        ],
        "total_entries": 2
    }))
}

async fn create_document(body: axum::body::Bytes) -> Json<Value> {
    let size = body.len();
    Json(json!({"results": {"document_id": "doc-new", "message": "queued", "bytes": size}}))
}

async fn get_document(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return not_found("document");
    }
    Json(json!({
        "results": {
            "id": id,
            "title": format!("Document {id}"),
            "metadata": {"author": "mock"},
            "summary": "A short document about retrieval."
        }
    }))
    .into_response()
}

async fn delete_document(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return not_found("document");
    }
    Json(json!({"results": {"success": true}})).into_response()
}

async fn document_chunks(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"results": [{"id": "chunk-1", "document_id": id, "text": "first chunk"}]}))
}

async fn list_collections() -> Json<Value> {
    Json(json!({"results": [{"id": "col-1", "name": "Papers"}], "total_entries": 1}))
}

async fn create_collection(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({"results": {"id": "col-new", "name": body["name"], "description": body["description"]}}))
}

async fn get_collection(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return not_found("collection");
    }
    Json(json!({"results": {"id": id, "name": "Papers", "document_count": 2}})).into_response()
}

async fn collection_documents(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return not_found("collection");
    }
    Json(json!({"results": [{"id": "doc-1"}, {"id": "doc-2"}], "total_entries": 2}))
        .into_response()
}

async fn search(Json(body): Json<Value>) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default().to_string();
    let chunks = if query == "nothing" {
        Vec::new()
    } else {
        vec![
            json!({"id": "chunk-1", "document_id": "doc-1", "score": 0.92,
                   "text": format!("First passage about {query}.")}),
            json!({"id": "chunk-2", "document_id": "doc-2", "score": 0.81,
                   "text": format!("Second passage about {query}.")}),
        ]
    };
    Json(json!({
        "results": {"chunk_search_results": chunks, "graph_search_results": []},
        "echo": body
    }))
}

async fn rag(Json(body): Json<Value>) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default();
    Json(json!({
        "results": {
            "generated_answer": format!("Answer to {query}"),
            "citations": [{"id": "cite-1", "text": "Cited passage."}]
        }
    }))
}

fn id_param() -> Value {
    json!({"name": "id", "in": "path", "required": true, "schema": {"type": "string"}})
}

fn page_params() -> Value {
    json!([
        {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 100}},
        {"name": "offset", "in": "query", "schema": {"type": "integer", "default": 0}}
    ])
}

fn ok_response() -> Value {
    json!({"200": {"description": "Successful Response"}})
}

/// `OpenAPI` document describing the mock's `/v3` routes.
///
/// Like FastAPI-generated documents trimmed by hand, only some operations declare `responses`.
#[must_use]
pub fn openapi_document() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {"title": "R2R Application API", "version": "3.5.0"},
        "paths": {
            "/v3/health": {
                "get": {
                    "operationId": "health",
                    "summary": "Health check",
                    "responses": ok_response()
                }
            },
            "/v3/documents": {
                "get": {
                    "operationId": "list_documents",
                    "summary": "List documents",
                    "parameters": page_params(),
                    "responses": ok_response()
                },
                "post": {
                    "operationId": "create_document",
                    "summary": "Ingest a document",
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {
                            "type": "object",
                            "required": ["raw_text"],
                            "properties": {
                                "raw_text": {"type": "string"},
                                "metadata": {"type": "object"}
                            }
                        }}}
                    }
                }
            },
            "/v3/documents/{id}": {
                "parameters": [id_param()],
                "get": {"operationId": "get_document", "summary": "Get a document"},
                "delete": {"operationId": "delete_document", "summary": "Delete a document"}
            },
            "/v3/documents/{id}/chunks": {
                "get": {
                    "operationId": "list_document_chunks",
                    "summary": "List a document's chunks",
                    "parameters": [id_param()]
                }
            },
            "/v3/collections": {
                "get": {
                    "operationId": "list_collections",
                    "summary": "List collections",
                    "parameters": page_params(),
                    "responses": ok_response()
                },
                "post": {
                    "operationId": "create_collection",
                    "summary": "Create a collection",
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {
                            "type": "object",
                            "required": ["name"],
                            "properties": {
                                "name": {"type": "string"},
                                "description": {"type": "string"}
                            }
                        }}}
                    }
                }
            },
            "/v3/collections/{id}": {
                "get": {
                    "operationId": "get_collection",
                    "summary": "Get a collection",
                    "parameters": [id_param()]
                }
            },
            "/v3/collections/{id}/documents": {
                "get": {
                    "operationId": "list_collection_documents",
                    "summary": "List documents in a collection",
                    "parameters": [id_param()]
                }
            },
            "/v3/retrieval/search": {
                "post": {
                    "operationId": "search",
                    "summary": "Search chunks",
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {
                            "type": "object",
                            "required": ["query"],
                            "properties": {
                                "query": {"type": "string"},
                                "search_settings": {"type": "object"}
                            }
                        }}}
                    }
                }
            }
        }
    })
}
