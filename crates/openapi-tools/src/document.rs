//! Loading and parsing of the `OpenAPI` document.
//!
//! R2R serves an `OpenAPI` 3.1 document. `openapiv3` models 3.0, so a few 3.1 schema spellings are
//! rewritten into their 3.0 equivalents before the document is deserialized:
//!
//! - `type: [string, "null"]` becomes `type: string` plus `nullable: true`
//! - numeric `exclusiveMinimum` / `exclusiveMaximum` become `minimum` / `maximum` plus the boolean
//!   flag

use crate::error::{OpenApiToolsError, Result};
use openapiv3::OpenAPI;
use r2r_mcp_http_tools::HttpMethod;
use r2r_mcp_http_tools::safety::sanitize_reqwest_error;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Where a document lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocLocation {
    Url(Url),
    File(PathBuf),
}

impl DocLocation {
    /// Parse a location: `http(s)://` and `file://` URLs, anything else is a file path.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed URLs.
    pub fn parse(location: &str) -> Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let mut url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Invalid OpenAPI URL '{location}': {e}"))
            })?;
            url.set_fragment(None);
            return Ok(Self::Url(url));
        }
        if location.starts_with("file://") {
            let path = Url::parse(location)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| {
                    OpenApiToolsError::OpenApi(format!("Invalid file URL '{location}'"))
                })?;
            return Ok(Self::File(std::fs::canonicalize(&path).unwrap_or(path)));
        }
        let path = PathBuf::from(location);
        Ok(Self::File(std::fs::canonicalize(&path).unwrap_or(path)))
    }
}

impl fmt::Display for DocLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(u) => write!(f, "{u}"),
            Self::File(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Summary of a loaded document, as reported by the server info resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecInfo {
    pub openapi_version: String,
    pub title: String,
    pub api_version: String,
    pub total_paths: usize,
    pub total_operations: usize,
}

impl SpecInfo {
    #[must_use]
    pub fn from_spec(spec: &OpenAPI) -> Self {
        let total_operations = spec
            .paths
            .paths
            .values()
            .filter_map(|item| item.as_item())
            .map(|item| {
                item.iter()
                    .filter(|(method, _)| HttpMethod::parse(method).is_some())
                    .count()
            })
            .sum();
        Self {
            openapi_version: spec.openapi.clone(),
            title: spec.info.title.clone(),
            api_version: spec.info.version.clone(),
            total_paths: spec.paths.paths.len(),
            total_operations,
        }
    }
}

/// A parsed document: the normalized JSON tree (used for `$ref` lookups) and its typed view.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub location: DocLocation,
    pub raw: Value,
    pub spec: OpenAPI,
}

/// Fetch (URL) or read (file) and parse the document at `location`.
///
/// # Errors
///
/// Returns an error if the document cannot be retrieved or is not an `OpenAPI` document.
pub async fn load_document(location: &str, client: &Client) -> Result<LoadedDocument> {
    let doc = DocLocation::parse(location)?;
    let text = match &doc {
        DocLocation::Url(url) => {
            tracing::info!(url = %url, "fetching OpenAPI document");
            let response = client.get(url.clone()).send().await.map_err(|e| {
                OpenApiToolsError::OpenApiSpecFetch {
                    url: location.to_string(),
                    message: sanitize_reqwest_error(&e),
                }
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(OpenApiToolsError::OpenApiSpecFetch {
                    url: location.to_string(),
                    message: format!("status {status}"),
                });
            }
            response
                .text()
                .await
                .map_err(|e| OpenApiToolsError::OpenApiSpecFetch {
                    url: location.to_string(),
                    message: sanitize_reqwest_error(&e),
                })?
        }
        DocLocation::File(path) => {
            tracing::info!(path = %path.display(), "loading OpenAPI document");
            std::fs::read_to_string(path).map_err(|e| OpenApiToolsError::OpenApiSpecReadFile {
                path: location.to_string(),
                source: e,
            })?
        }
    };

    let (raw, spec) = parse_document(&text, location)?;
    Ok(LoadedDocument {
        location: doc,
        raw,
        spec,
    })
}

/// Parse document text (JSON or YAML), normalize it and deserialize the typed view.
///
/// # Errors
///
/// Returns an error for unparsable text or documents without the `OpenAPI` structure.
pub fn parse_document(text: &str, location: &str) -> Result<(Value, OpenAPI)> {
    let mut raw = parse_document_text(text, location)?;
    if raw.get("openapi").and_then(Value::as_str).is_none() {
        return Err(OpenApiToolsError::OpenApi(format!(
            "document at '{location}' has no 'openapi' version field"
        )));
    }
    normalize_document(&mut raw);
    let spec: OpenAPI = serde_json::from_value(raw.clone()).map_err(|e| {
        OpenApiToolsError::OpenApi(format!(
            "document at '{location}' is not a valid OpenAPI document: {e}"
        ))
    })?;
    Ok((raw, spec))
}

/// Parse JSON or YAML text into a JSON tree (JSON is accepted by the YAML parser).
///
/// # Errors
///
/// Returns an error when the text is neither.
pub fn parse_document_text(text: &str, location: &str) -> Result<Value> {
    serde_yaml::from_str(text).map_err(|source| OpenApiToolsError::OpenApiSpecParse {
        location: location.to_string(),
        source,
    })
}

const OPERATION_KEYS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Rewrite 3.1 spellings into the 3.0 forms `openapiv3` accepts.
///
/// Operations without `responses` (optional since 3.1) get an empty `default` response.
pub fn normalize_document(value: &mut Value) {
    normalize_schema_spellings(value);
    fill_missing_responses(value);
}

fn fill_missing_responses(value: &mut Value) {
    let Some(paths) = value.get_mut("paths").and_then(Value::as_object_mut) else {
        return;
    };
    for item in paths.values_mut().filter_map(Value::as_object_mut) {
        for key in OPERATION_KEYS {
            if let Some(op) = item.get_mut(key).and_then(Value::as_object_mut) {
                op.entry("responses")
                    .or_insert_with(|| serde_json::json!({"default": {"description": ""}}));
            }
        }
    }
}

fn normalize_schema_spellings(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(types)) = map.get("type") {
                let nullable = types.iter().any(|t| t.as_str() == Some("null"));
                let concrete: Vec<Value> = types
                    .iter()
                    .filter(|t| t.as_str().is_some_and(|s| s != "null"))
                    .cloned()
                    .collect();
                if concrete.len() == 1 {
                    map.insert("type".into(), concrete[0].clone());
                } else {
                    map.remove("type");
                }
                if nullable {
                    map.insert("nullable".into(), Value::Bool(true));
                }
            }

            for (exclusive, bound) in [
                ("exclusiveMinimum", "minimum"),
                ("exclusiveMaximum", "maximum"),
            ] {
                if let Some(n) = map.get(exclusive).filter(|v| v.is_number()).cloned() {
                    map.insert(bound.into(), n);
                    map.insert(exclusive.into(), Value::Bool(true));
                }
            }

            for v in map.values_mut() {
                normalize_schema_spellings(v);
            }
        }
        Value::Array(items) => {
            for v in items {
                normalize_schema_spellings(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_31_schema_spellings() {
        let mut v = json!({
            "components": {"schemas": {"X": {
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "exclusiveMinimum": 0},
                    "owner": {"type": ["string", "null"]},
                    "either": {"type": ["string", "integer"]}
                }
            }}}
        });
        normalize_document(&mut v);
        let props = &v["components"]["schemas"]["X"]["properties"];
        assert_eq!(props["limit"]["minimum"], 0);
        assert_eq!(props["limit"]["exclusiveMinimum"], true);
        assert_eq!(props["owner"]["type"], "string");
        assert_eq!(props["owner"]["nullable"], true);
        assert!(props["either"].get("type").is_none());
    }

    #[test]
    fn parses_fastapi_style_31_document() {
        let text = r#"{
            "openapi": "3.1.0",
            "info": {"title": "R2R Application API", "version": "3.5.0"},
            "paths": {
                "/v3/documents": {
                    "get": {
                        "operationId": "list_documents",
                        "parameters": [{
                            "name": "limit", "in": "query", "required": false,
                            "schema": {"type": "integer", "exclusiveMinimum": 0, "maximum": 1000}
                        }],
                        "responses": {"200": {"description": "ok"}}
                    },
                    "head": {"responses": {"200": {"description": "ok"}}}
                },
                "/v3/documents/{id}": {
                    "delete": {"responses": {"200": {"description": "ok"}}}
                }
            }
        }"#;
        let (_, spec) = parse_document(text, "inline").expect("parse");
        let info = SpecInfo::from_spec(&spec);
        assert_eq!(info.openapi_version, "3.1.0");
        assert_eq!(info.title, "R2R Application API");
        assert_eq!(info.api_version, "3.5.0");
        assert_eq!(info.total_paths, 2);
        assert_eq!(info.total_operations, 2);
    }

    #[test]
    fn operations_without_responses_get_a_default() {
        let text = r#"{
            "openapi": "3.1.0",
            "info": {"title": "R2R Application API", "version": "3.5.0"},
            "paths": {
                "/v3/documents/{id}": {
                    "get": {"operationId": "get_document"},
                    "delete": {
                        "operationId": "delete_document",
                        "responses": {"200": {"description": "ok"}}
                    }
                }
            }
        }"#;
        let (raw, spec) = parse_document(text, "inline.json").expect("parse");
        let item = &raw["paths"]["/v3/documents/{id}"];
        assert_eq!(item["get"]["responses"]["default"]["description"], "");
        assert!(item["delete"]["responses"].get("default").is_none());

        let ops: Vec<_> = spec
            .operations()
            .filter_map(|(_, _, op)| op.operation_id.clone())
            .collect();
        assert_eq!(ops, ["get_document", "delete_document"]);
    }

    #[test]
    fn parses_mock_deployment_document() {
        use r2r_mcp_test_support::mock_r2r::{TOTAL_PATHS, openapi_document};

        let text = openapi_document().to_string();
        let (raw, spec) = parse_document(&text, "mock.json").expect("parse");
        let info = SpecInfo::from_spec(&spec);
        assert_eq!(info.total_paths, TOTAL_PATHS);
        assert_eq!(info.total_operations, 11);
        assert!(raw["paths"]["/v3/retrieval/search"]["post"]["responses"].is_object());
    }

    #[test]
    fn rejects_documents_without_openapi_field() {
        let err = parse_document("{\"swagger\": \"2.0\"}", "old.json").expect_err("reject");
        assert!(err.to_string().contains("openapi"));
        assert!(parse_document(": : :", "garbage").is_err());
    }

    #[tokio::test]
    async fn loads_yaml_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("openapi.yaml");
        std::fs::write(
            &path,
            "openapi: 3.0.0\ninfo:\n  title: t\n  version: '1'\npaths: {}\n",
        )
        .expect("write");

        let doc = load_document(path.to_str().expect("utf8 path"), &Client::new())
            .await
            .expect("load");
        assert_eq!(doc.spec.info.title, "t");
        assert!(matches!(doc.location, DocLocation::File(_)));
    }

    #[test]
    fn locations() {
        assert!(matches!(
            DocLocation::parse("http://localhost:7272/openapi.json#frag"),
            Ok(DocLocation::Url(u)) if u.fragment().is_none()
        ));
        assert!(matches!(
            DocLocation::parse("./openapi.yaml"),
            Ok(DocLocation::File(_))
        ));
    }
}
