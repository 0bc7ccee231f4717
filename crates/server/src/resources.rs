//! Built-in resources and resource templates.
//!
//! These sit beside the resources generated from the `OpenAPI` document. Upstream failures while
//! reading a template are reported inside the JSON payload rather than as protocol errors, so a
//! client always gets a readable document back.

use crate::error::Result;
use crate::handler::AppState;
use r2r_mcp_client::SearchSettings;
use r2r_mcp_openapi_tools::uri::match_template;
use r2r_mcp_openapi_tools::RouteMapInfo;
use rmcp::model::{Annotated, RawResource, ReadResourceResult, Resource, ResourceTemplate};
use serde_json::{Value, json};

pub const SERVER_NAME: &str = "R2R MCP Server";
pub const SERVER_DESCRIPTION: &str = "R2R API - Document management, knowledge graphs, and AI";

pub const INFO_URI: &str = "r2r://server/info";
pub const ROUTES_URI: &str = "r2r://server/routes";
pub const DOCUMENT_TEMPLATE: &str = "r2r://documents/{document_id}";
pub const COLLECTION_SUMMARY_TEMPLATE: &str = "r2r://collections/{collection_id}/summary";
pub const SEARCH_RESULTS_TEMPLATE: &str = "r2r://search/results/{query}{?limit}";

const JSON_MIME: &str = "application/json";
const DEFAULT_TEMPLATE_SEARCH_LIMIT: u32 = 10;

#[must_use]
pub fn list_resources() -> Vec<Resource> {
    [
        (INFO_URI, "server_info", "Server configuration and OpenAPI details"),
        (ROUTES_URI, "route_mappings", "Route-map table used to classify R2R endpoints"),
    ]
    .into_iter()
    .map(|(uri, name, description)| {
        let mut raw = RawResource::new(uri, name.to_string());
        raw.description = Some(description.to_string());
        raw.mime_type = Some(JSON_MIME.to_string());
        Annotated::new(raw, None)
    })
    .collect()
}

/// # Errors
///
/// Never fails in practice; the template definitions are static.
pub fn list_resource_templates() -> Result<Vec<ResourceTemplate>> {
    let defs = json!([
        {
            "uriTemplate": DOCUMENT_TEMPLATE,
            "name": "document",
            "description": "A document by id",
            "mimeType": JSON_MIME
        },
        {
            "uriTemplate": COLLECTION_SUMMARY_TEMPLATE,
            "name": "collection_summary",
            "description": "Collection details with its document count",
            "mimeType": JSON_MIME
        },
        {
            "uriTemplate": SEARCH_RESULTS_TEMPLATE,
            "name": "search_results",
            "description": "Search results for a query (default limit 10)",
            "mimeType": JSON_MIME
        }
    ]);
    Ok(serde_json::from_value(defs)?)
}

/// Read a built-in resource or template instance. `Ok(None)` when `uri` is not one of ours.
///
/// # Errors
///
/// Returns an error only if a payload cannot be serialized.
pub async fn read(state: &AppState, uri: &str) -> Result<Option<ReadResourceResult>> {
    let payload = if uri == INFO_URI {
        server_info(state)
    } else if uri == ROUTES_URI {
        routes_info(&state.source.route_maps())
    } else if let Some(vars) = match_template(DOCUMENT_TEMPLATE, uri) {
        document(state, vars.get("document_id").map_or("", String::as_str)).await?
    } else if let Some(vars) = match_template(COLLECTION_SUMMARY_TEMPLATE, uri) {
        collection_summary(state, vars.get("collection_id").map_or("", String::as_str)).await
    } else if let Some(vars) = match_template(SEARCH_RESULTS_TEMPLATE, uri) {
        let limit = vars
            .get("limit")
            .and_then(|l| l.parse().ok())
            .unwrap_or(DEFAULT_TEMPLATE_SEARCH_LIMIT);
        search_results(state, vars.get("query").map_or("", String::as_str), limit).await
    } else {
        return Ok(None);
    };
    json_result(uri, &payload).map(Some)
}

pub(crate) fn json_result(uri: &str, payload: &Value) -> Result<ReadResourceResult> {
    let result = json!({
        "contents": [{
            "uri": uri,
            "mimeType": JSON_MIME,
            "text": serde_json::to_string_pretty(payload)?,
        }]
    });
    Ok(serde_json::from_value(result)?)
}

/// Server identity, effective configuration and what the `OpenAPI` document produced.
///
/// `auth_configured` is evaluated on every read.
#[must_use]
pub fn server_info(state: &AppState) -> Value {
    let settings = &state.settings;
    let openapi = state.source.spec_info().map(|info| {
        json!({
            "version": info.openapi_version,
            "title": info.title,
            "api_version": info.api_version,
            "total_endpoints": info.total_paths,
            "total_operations": info.total_operations,
        })
    });
    json!({
        "server": {
            "name": SERVER_NAME,
            "description": SERVER_DESCRIPTION,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "configuration": {
            "base_url": settings.base_url,
            "openapi_url": settings.openapi_url,
            "auth_configured": state.credentials.is_configured(),
            "debug_logging": settings.debug_logging,
        },
        "openapi": openapi,
        "capabilities": state.source.counts(),
    })
}

/// The route-map table plus an example path for each capability kind.
#[must_use]
pub fn routes_info(maps: &[RouteMapInfo]) -> Value {
    let mappings: Vec<Value> = maps
        .iter()
        .map(|m| {
            json!({
                "priority": m.priority,
                "methods": m.methods,
                "pattern": m.pattern,
                "mcp_type": m.kind,
                "description": m.description,
            })
        })
        .collect();
    json!({
        "description": "Route mappings that decide how R2R endpoints are exposed over MCP",
        "total_route_maps": maps.len(),
        "mappings": mappings,
        "examples": {
            "resource_template": [
                "GET /v3/chunks/{id}",
                "GET /v3/documents/{id}/chunks",
                "GET /v3/collections/{id}/documents"
            ],
            "resource": [
                "GET /v3/chunks",
                "GET /v3/documents",
                "GET /v3/collections",
                "GET /v3/graphs"
            ],
            "tool": [
                "POST /v3/chunks/search",
                "DELETE /v3/documents/{id}",
                "POST /v3/collections"
            ]
        },
        "note": "Route maps are evaluated in priority order - first match wins",
    })
}

async fn document(state: &AppState, document_id: &str) -> Result<Value> {
    match state.client.get_document(document_id).await {
        Ok(doc) => Ok(serde_json::to_value(doc)?),
        Err(e) => {
            tracing::warn!(%document_id, error = %e, "document template read failed");
            Ok(json!({
                "error": format!("Failed to fetch document: {e}"),
                "document_id": document_id,
            }))
        }
    }
}

async fn collection_summary(state: &AppState, collection_id: &str) -> Value {
    let fetched = async {
        let info = state.client.get_collection(collection_id).await?;
        let documents = state.client.list_collection_documents(collection_id).await?;
        Ok::<_, r2r_mcp_client::R2rError>((info, documents))
    };
    match fetched.await {
        Ok((info, documents)) => json!({
            "collection_id": collection_id,
            "collection_info": info,
            "document_count": documents.results.len(),
            "fetched_at": crate::timestamp(),
        }),
        Err(e) => {
            tracing::warn!(%collection_id, error = %e, "collection summary read failed");
            json!({
                "error": format!("Failed to fetch collection summary: {e}"),
                "collection_id": collection_id,
            })
        }
    }
}

async fn search_results(state: &AppState, query: &str, limit: u32) -> Value {
    let settings = SearchSettings::default().with_limit(limit);
    match state.client.search_exact(query, settings).await {
        Ok(results) => json!({
            "query": query,
            "limit": limit,
            "results": results,
            "searched_at": crate::timestamp(),
        }),
        Err(e) => {
            tracing::warn!(%query, error = %e, "search template read failed");
            json!({
                "error": format!("Search failed: {e}"),
                "query": query,
            })
        }
    }
}
