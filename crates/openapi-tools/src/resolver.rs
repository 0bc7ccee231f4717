//! `$ref` resolution for `OpenAPI` documents.
//!
//! `openapiv3` models references as `ReferenceOr<T>` without following them. R2R's document only
//! uses local `#/components/...` pointers, but documents split across files or URLs are handled
//! too: a `$ref` is resolved relative to the document that contains it.

use crate::document::{DocLocation, normalize_document, parse_document_text};
use crate::error::{OpenApiToolsError, Result};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use openapiv3::ReferenceOr;
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Nesting limit when inlining schema references; deeper (or recursive) refs stay as `$ref`.
pub const MAX_INLINE_DEPTH: usize = 8;

/// A value together with the document it was read from.
#[derive(Debug, Clone)]
pub struct Located<T> {
    pub doc: DocLocation,
    pub item: T,
}

#[derive(Debug)]
pub struct RefResolver {
    root: DocLocation,
    client: Client,
    docs: RwLock<HashMap<DocLocation, Arc<Value>>>,
}

impl RefResolver {
    /// Resolver seeded with the already-parsed root document.
    #[must_use]
    pub fn new(root: DocLocation, root_value: Value, client: Client) -> Self {
        let mut docs = HashMap::new();
        docs.insert(root.clone(), Arc::new(root_value));
        Self {
            root,
            client,
            docs: RwLock::new(docs),
        }
    }

    #[must_use]
    pub fn root(&self) -> &DocLocation {
        &self.root
    }

    /// Follow `r` (and any chain of refs it points to) to a concrete item.
    ///
    /// # Errors
    ///
    /// Returns an error for cyclic chains, unsupported fragments, unloadable documents, missing
    /// pointers, or targets that do not deserialize as `T`.
    pub async fn resolve<T>(&self, doc: &DocLocation, r: &ReferenceOr<T>) -> Result<Located<T>>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut doc = doc.clone();
        let mut cur = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok(Located { doc, item }),
                ReferenceOr::Reference { reference } => {
                    let (target, pointer) = parse_ref(&doc, &reference)?;
                    if !seen.insert(ref_key(&target, pointer.as_deref())) {
                        return Err(OpenApiToolsError::OpenApi(format!(
                            "Cyclic $ref detected while resolving: {reference}"
                        )));
                    }
                    let value = self.lookup(&target, pointer.as_deref(), &reference).await?;
                    cur = serde_json::from_value(value).map_err(|e| {
                        OpenApiToolsError::OpenApi(format!(
                            "Referenced value '{reference}' in {target} has an unexpected shape: {e}"
                        ))
                    })?;
                    doc = target;
                }
            }
        }
    }

    /// Replace `{"$ref": ...}` objects inside a JSON schema with their targets.
    ///
    /// Refs that cannot be resolved, and refs nested deeper than [`MAX_INLINE_DEPTH`], are left
    /// untouched.
    pub async fn inline_schema(&self, doc: &DocLocation, schema: Value) -> Value {
        self.inline_at(doc, schema, 0).await
    }

    fn inline_at<'a>(
        &'a self,
        doc: &'a DocLocation,
        value: Value,
        depth: usize,
    ) -> BoxFuture<'a, Value> {
        async move {
            match value {
                Value::Object(map) => {
                    if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                        if depth >= MAX_INLINE_DEPTH {
                            return Value::Object(map);
                        }
                        let Ok((target, pointer)) = parse_ref(doc, reference) else {
                            return Value::Object(map);
                        };
                        let Ok(resolved) =
                            self.lookup(&target, pointer.as_deref(), reference).await
                        else {
                            return Value::Object(map);
                        };
                        let mut inlined = self.inline_at(&target, resolved, depth + 1).await;
                        // Sibling keywords (3.1 allows e.g. `description` next to `$ref`) win.
                        if let Value::Object(target_map) = &mut inlined {
                            for (k, v) in map {
                                if k != "$ref" {
                                    target_map.insert(k, v);
                                }
                            }
                        }
                        return inlined;
                    }

                    let mut out = serde_json::Map::with_capacity(map.len());
                    for (k, v) in map {
                        let v = self.inline_at(doc, v, depth).await;
                        out.insert(k, v);
                    }
                    Value::Object(out)
                }
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for v in items {
                        out.push(self.inline_at(doc, v, depth).await);
                    }
                    Value::Array(out)
                }
                other => other,
            }
        }
        .boxed()
    }

    async fn lookup(
        &self,
        target: &DocLocation,
        pointer: Option<&str>,
        reference: &str,
    ) -> Result<Value> {
        let doc_value = self.load(target).await?;
        match pointer {
            Some(ptr) => doc_value.pointer(ptr).cloned().ok_or_else(|| {
                OpenApiToolsError::OpenApi(format!(
                    "Unresolved $ref '{reference}' ({target} has no '{ptr}')"
                ))
            }),
            None => Ok((*doc_value).clone()),
        }
    }

    async fn load(&self, doc: &DocLocation) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let text = match doc {
            DocLocation::File(path) => std::fs::read_to_string(path).map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "Failed to read referenced file {}: {e}",
                    path.display()
                ))
            })?,
            DocLocation::Url(url) => {
                let response = self.client.get(url.clone()).send().await.map_err(|e| {
                    OpenApiToolsError::OpenApi(format!(
                        "Failed to fetch referenced document {doc}: {}",
                        r2r_mcp_http_tools::safety::sanitize_reqwest_error(&e)
                    ))
                })?;
                response.text().await.map_err(|e| {
                    OpenApiToolsError::OpenApi(format!(
                        "Failed to read referenced document {doc}: {}",
                        r2r_mcp_http_tools::safety::sanitize_reqwest_error(&e)
                    ))
                })?
            }
        };

        let mut value = parse_document_text(&text, &doc.to_string())?;
        normalize_document(&mut value);
        let value = Arc::new(value);
        self.docs.write().insert(doc.clone(), Arc::clone(&value));
        Ok(value)
    }
}

/// Split a `$ref` into the target document and an optional JSON pointer.
fn parse_ref(current: &DocLocation, reference: &str) -> Result<(DocLocation, Option<String>)> {
    let (doc_part, fragment) = match reference.split_once('#') {
        Some((d, f)) => (d, Some(f)),
        None => (reference, None),
    };

    let pointer = match fragment {
        None | Some("") => None,
        Some(f) if f.starts_with('/') => Some(f.to_string()),
        Some(_) => {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Unsupported $ref fragment (expected a JSON pointer): {reference}"
            )));
        }
    };

    Ok((resolve_location(current, doc_part)?, pointer))
}

fn resolve_location(current: &DocLocation, doc_part: &str) -> Result<DocLocation> {
    if doc_part.is_empty() {
        return Ok(current.clone());
    }
    if doc_part.starts_with("http://")
        || doc_part.starts_with("https://")
        || doc_part.starts_with("file://")
    {
        return DocLocation::parse(doc_part);
    }

    match current {
        DocLocation::Url(base) => base
            .join(doc_part)
            .map(|mut u: Url| {
                u.set_fragment(None);
                DocLocation::Url(u)
            })
            .map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "Cannot resolve '{doc_part}' against {base}: {e}"
                ))
            }),
        DocLocation::File(base) => {
            let joined = if Path::new(doc_part).is_absolute() {
                PathBuf::from(doc_part)
            } else {
                base.parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(doc_part)
            };
            Ok(DocLocation::File(
                std::fs::canonicalize(&joined).unwrap_or(joined),
            ))
        }
    }
}

fn ref_key(doc: &DocLocation, pointer: Option<&str>) -> String {
    format!("{doc}#{}", pointer.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapiv3::{Parameter, Schema};
    use serde_json::json;
    use std::fs;

    fn root() -> DocLocation {
        DocLocation::File(PathBuf::from("/virtual/openapi.json"))
    }

    fn spec() -> Value {
        json!({
            "openapi": "3.1.0",
            "info": {"title": "R2R", "version": "3"},
            "paths": {},
            "components": {
                "parameters": {
                    "Limit": {"$ref": "#/components/parameters/LimitInner"},
                    "LimitInner": {"name": "limit", "in": "query", "schema": {"type": "integer"}},
                    "Loop": {"$ref": "#/components/parameters/Loop"}
                },
                "schemas": {
                    "SearchSettings": {
                        "type": "object",
                        "properties": {
                            "limit": {"type": "integer"},
                            "filters": {"$ref": "#/components/schemas/Filters"}
                        }
                    },
                    "Filters": {"type": "object", "description": "filters"},
                    "Node": {
                        "type": "object",
                        "properties": {"child": {"$ref": "#/components/schemas/Node"}}
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn follows_ref_chains() {
        let r = RefResolver::new(root(), spec(), Client::new());
        let param: ReferenceOr<Parameter> = ReferenceOr::Reference {
            reference: "#/components/parameters/Limit".into(),
        };
        let located = r.resolve(r.root(), &param).await.expect("resolved");
        assert_eq!(located.item.parameter_data_ref().name, "limit");
    }

    #[tokio::test]
    async fn detects_cycles_and_missing_pointers() {
        let r = RefResolver::new(root(), spec(), Client::new());
        let cyclic: ReferenceOr<Parameter> = ReferenceOr::Reference {
            reference: "#/components/parameters/Loop".into(),
        };
        let err = r.resolve(r.root(), &cyclic).await.expect_err("cycle");
        assert!(err.to_string().contains("Cyclic"));

        let missing: ReferenceOr<Schema> = ReferenceOr::Reference {
            reference: "#/components/schemas/Nope".into(),
        };
        assert!(r.resolve(r.root(), &missing).await.is_err());
    }

    #[tokio::test]
    async fn inlines_nested_schema_refs() {
        let r = RefResolver::new(root(), spec(), Client::new());
        let inlined = r
            .inline_schema(
                r.root(),
                json!({"$ref": "#/components/schemas/SearchSettings", "description": "settings"}),
            )
            .await;
        assert_eq!(inlined["type"], "object");
        assert_eq!(inlined["description"], "settings");
        assert_eq!(inlined["properties"]["filters"]["description"], "filters");
    }

    #[tokio::test]
    async fn recursive_schemas_stop_at_depth_limit() {
        let r = RefResolver::new(root(), spec(), Client::new());
        let inlined = r
            .inline_schema(r.root(), json!({"$ref": "#/components/schemas/Node"}))
            .await;
        let mut cur = &inlined;
        for _ in 0..MAX_INLINE_DEPTH {
            cur = &cur["properties"]["child"];
        }
        assert_eq!(cur["$ref"], "#/components/schemas/Node");
    }

    #[tokio::test]
    async fn resolves_refs_into_sibling_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("common.yaml"),
            "components:\n  schemas:\n    Id:\n      type: string\n      format: uuid\n",
        )
        .expect("write");
        let root_path = dir.path().join("openapi.yaml");
        let root = DocLocation::File(root_path);

        let r = RefResolver::new(root.clone(), json!({}), Client::new());
        let schema: ReferenceOr<Schema> = ReferenceOr::Reference {
            reference: "common.yaml#/components/schemas/Id".into(),
        };
        let located = r.resolve(&root, &schema).await.expect("resolved");
        assert!(matches!(located.doc, DocLocation::File(ref p) if p.ends_with("common.yaml")));
    }
}
