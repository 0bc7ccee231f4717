//! `OpenAPI` capability source runtime.
//!
//! Loads the R2R `OpenAPI` document, turns every supported operation into an MCP tool, resource or
//! resource template (per the route-map table) and executes the outbound HTTP requests behind
//! `tools/call` and `resources/read`.

use crate::classify::{CapabilityKind, HttpMethod, OperationDescriptor};
use crate::config::ApiServerConfig;
use crate::document::{DocLocation, SpecInfo, load_document, parse_document};
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::RefResolver;
use crate::route_map::{RouteMap, RouteMapInfo, classify_with, describe};
use crate::uri::{api_uri, match_template, split_query};
use base64::Engine as _;
use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterSchemaOrContent, ReferenceOr, RequestBody,
};
use parking_lot::RwLock;
use r2r_mcp_http_tools::client::{ResponseBody, build_client, expect_success};
use r2r_mcp_http_tools::{CredentialResolver, HttpToolsError};
use reqwest::Client;
use rmcp::model::{
    Annotated, CallToolResult, Content, JsonObject, RawResource, ReadResourceResult, Resource,
    ResourceContents, ResourceTemplate, Tool,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

const JSON_MIME: &str = "application/json";
const MAX_NAME_LEN: usize = 64;

/// Publishes the operations of an `OpenAPI` document as MCP capabilities.
#[derive(Clone)]
pub struct OpenApiCapabilitySource {
    config: ApiServerConfig,
    route_maps: Arc<Vec<RouteMap>>,
    client: Client,
    credentials: CredentialResolver,
    /// Set by `start`; replaced wholesale on reload.
    api: Arc<RwLock<Option<Arc<DiscoveredApi>>>>,
}

/// Everything derived from one loaded document.
#[derive(Debug)]
struct DiscoveredApi {
    info: SpecInfo,
    base_url: String,
    operations: Vec<GeneratedOperation>,
}

#[derive(Debug, Clone)]
struct GeneratedOperation {
    descriptor: OperationDescriptor,
    kind: CapabilityKind,
    title: Option<String>,
    description: String,
    parameters: Vec<OperationParameter>,
    body_encoding: Option<BodyEncoding>,
    input_schema: Arc<JsonObject>,
    /// Resource URI or URI template; `None` for tools.
    uri: Option<String>,
}

#[derive(Debug, Clone)]
struct OperationParameter {
    /// Argument name exposed to MCP clients.
    name: String,
    /// Name on the wire (differs from `name` when a body property was renamed).
    wire_name: String,
    location: ParamLocation,
    required: bool,
    schema: Value,
    binary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamLocation {
    Path,
    Query,
    Header,
    /// One property of a flattened object body.
    Body,
    /// The whole request body as a single argument.
    WholeBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEncoding {
    Json,
    Form,
    Multipart,
}

impl BodyEncoding {
    fn from_media_type(media_type: &str) -> Option<Self> {
        let lower = media_type.to_ascii_lowercase();
        if lower == "multipart/form-data" {
            Some(Self::Multipart)
        } else if lower == "application/x-www-form-urlencoded" {
            Some(Self::Form)
        } else if lower == JSON_MIME || lower.ends_with("+json") {
            Some(Self::Json)
        } else {
            None
        }
    }
}

/// One published operation, as handed to the MCP registrar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub descriptor: OperationDescriptor,
    pub kind: CapabilityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Number of published capabilities per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityCounts {
    pub tools: usize,
    pub resources: usize,
    pub resource_templates: usize,
}

impl CapabilityCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.tools + self.resources + self.resource_templates
    }
}

#[derive(Debug, Default)]
struct RequestParts {
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: BodyPayload,
}

#[derive(Debug, Default)]
enum BodyPayload {
    #[default]
    None,
    Whole(Value),
    /// `(wire name, value, binary)` in declaration order.
    Fields(Vec<(String, Value, bool)>),
}

impl OpenApiCapabilitySource {
    /// Create a source. Nothing is loaded until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid route maps or when the HTTP client cannot be
    /// built.
    pub fn new(config: ApiServerConfig, credentials: CredentialResolver) -> Result<Self> {
        let mut route_maps = RouteMap::from_configs(&config.route_maps)?;
        route_maps.extend(RouteMap::defaults());
        let client = build_client(config.request_timeout())?;
        Ok(Self {
            config,
            route_maps: Arc::new(route_maps),
            client,
            credentials,
            api: Arc::new(RwLock::new(None)),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiServerConfig {
        &self.config
    }

    /// Load the document, discover operations and make the source ready for use.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be loaded or parsed, no base URL can be
    /// determined, or the startup timeout elapses.
    pub async fn start(&self) -> Result<()> {
        let startup_timeout = self.config.startup_timeout();
        let startup = async {
            let doc = load_document(&self.config.spec, &self.client).await?;
            self.discover(doc.location, doc.raw, &doc.spec).await
        };

        let api = match tokio::time::timeout(startup_timeout, startup).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(OpenApiToolsError::Startup(format!(
                    "Startup timeout after {}s while loading OpenAPI document '{}'",
                    startup_timeout.as_secs(),
                    self.config.spec
                )));
            }
        };
        self.install(api);
        Ok(())
    }

    /// Like [`start`](Self::start), with the document text supplied directly. Relative `$ref`s
    /// still resolve against the configured location.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not an `OpenAPI` document or no base URL can be
    /// determined.
    pub async fn start_from_str(&self, text: &str) -> Result<()> {
        let (raw, spec) = parse_document(text, &self.config.spec)?;
        let location = DocLocation::parse(&self.config.spec)?;
        let api = self.discover(location, raw, &spec).await?;
        self.install(api);
        Ok(())
    }

    fn install(&self, api: DiscoveredApi) {
        let counts = count(&api.operations);
        tracing::info!(
            title = %api.info.title,
            version = %api.info.api_version,
            openapi = %api.info.openapi_version,
            base_url = %api.base_url,
            tools = counts.tools,
            resources = counts.resources,
            resource_templates = counts.resource_templates,
            "OpenAPI capabilities ready"
        );
        *self.api.write() = Some(Arc::new(api));
    }

    fn current(&self) -> Result<Arc<DiscoveredApi>> {
        self.api.read().clone().ok_or_else(|| {
            OpenApiToolsError::Runtime("OpenAPI capabilities have not been loaded".to_string())
        })
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.api.read().is_some()
    }

    /// Summary of the loaded document.
    #[must_use]
    pub fn spec_info(&self) -> Option<SpecInfo> {
        self.api.read().as_ref().map(|api| api.info.clone())
    }

    /// Base URL requests are sent to, once started.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.api.read().as_ref().map(|api| api.base_url.clone())
    }

    /// The active route-map table, in priority order.
    #[must_use]
    pub fn route_maps(&self) -> Vec<RouteMapInfo> {
        describe(&self.route_maps)
    }

    /// Every published operation with its capability kind.
    #[must_use]
    pub fn registrations(&self) -> Vec<Registration> {
        let Some(api) = self.api.read().clone() else {
            return Vec::new();
        };
        api.operations
            .iter()
            .map(|op| Registration {
                descriptor: op.descriptor.clone(),
                kind: op.kind,
                uri: op.uri.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn counts(&self) -> CapabilityCounts {
        self.api
            .read()
            .as_ref()
            .map(|api| count(&api.operations))
            .unwrap_or_default()
    }

    async fn discover(
        &self,
        location: DocLocation,
        raw: Value,
        spec: &OpenAPI,
    ) -> Result<DiscoveredApi> {
        let info = SpecInfo::from_spec(spec);
        tracing::info!(
            title = %info.title,
            version = %info.api_version,
            "loaded OpenAPI document"
        );

        let base_url = self.base_url_for(spec)?;
        let resolver = RefResolver::new(location.clone(), raw, self.client.clone());
        let mut names: HashSet<String> = HashSet::new();
        let mut operations = Vec::new();

        for (path, item) in &spec.paths.paths {
            let item = match resolver.resolve(&location, item).await {
                Ok(located) => located,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping path");
                    continue;
                }
            };

            for (method, operation) in item.item.iter() {
                let Some(method) = HttpMethod::parse(method) else {
                    tracing::debug!(method, path = %path, "skipping unsupported method");
                    continue;
                };
                if !self
                    .config
                    .auto_discover
                    .allows(&format!("{method} {path}"))
                {
                    tracing::debug!(%method, path = %path, "excluded by autoDiscover");
                    continue;
                }

                let input = GenerationInput {
                    doc: &item.doc,
                    path_item_params: &item.item.parameters,
                    path,
                    method,
                    operation,
                };
                match self.generate(&resolver, input, &mut names).await {
                    Ok(op) => {
                        tracing::debug!(
                            name = %op.descriptor.name(),
                            %method,
                            path = %path,
                            kind = %op.kind,
                            "registered operation"
                        );
                        operations.push(op);
                    }
                    Err(e) => {
                        tracing::warn!(%method, path = %path, error = %e, "skipping operation");
                    }
                }
            }
        }

        Ok(DiscoveredApi {
            info,
            base_url,
            operations,
        })
    }

    async fn generate(
        &self,
        resolver: &RefResolver,
        input: GenerationInput<'_>,
        names: &mut HashSet<String>,
    ) -> Result<GeneratedOperation> {
        let GenerationInput {
            doc,
            path_item_params,
            path,
            method,
            operation,
        } = input;

        let base_name = operation
            .operation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| canonical_name(method, path));
        let name = reserve_unique_name(names, &base_name);
        let descriptor = OperationDescriptor::new(method, path, name)?;
        let kind = classify_with(&self.route_maps, &descriptor);

        let mut parameters =
            collect_parameters(resolver, doc, path_item_params, &operation.parameters).await?;

        let mut body_encoding = None;
        if let Some(body_ref) = &operation.request_body {
            let body = resolver.resolve(doc, body_ref).await?;
            if let Some((encoding, body_params)) =
                body_parameters(resolver, &body.doc, &body.item, &parameters).await?
            {
                body_encoding = Some(encoding);
                parameters.extend(body_params);
            }
        }

        let uri = match kind {
            CapabilityKind::Tool => None,
            CapabilityKind::Resource => Some(api_uri(descriptor.path())),
            CapabilityKind::ResourceTemplate => {
                let query: Vec<&str> = parameters
                    .iter()
                    .filter(|p| p.location == ParamLocation::Query)
                    .map(|p| p.name.as_str())
                    .collect();
                let mut template = api_uri(descriptor.path());
                if !query.is_empty() {
                    template.push_str(&format!("{{?{}}}", query.join(",")));
                }
                Some(template)
            }
        };

        let description = operation
            .summary
            .clone()
            .or_else(|| operation.description.clone())
            .unwrap_or_else(|| format!("Calls {method} {path}"));

        Ok(GeneratedOperation {
            input_schema: Arc::new(build_input_schema(&parameters)),
            descriptor,
            kind,
            title: operation.summary.clone(),
            description,
            parameters,
            body_encoding,
            uri,
        })
    }

    fn base_url_for(&self, spec: &OpenAPI) -> Result<String> {
        let base_url = self
            .config
            .base_url
            .clone()
            .or_else(|| spec.servers.first().map(|s| s.url.clone()))
            .ok_or_else(|| {
                OpenApiToolsError::OpenApi(
                    "No base URL configured and none found in the document".to_string(),
                )
            })?;
        self.resolve_base_url(&base_url)
    }

    fn resolve_base_url(&self, base_url: &str) -> Result<String> {
        if base_url.starts_with("http://") || base_url.starts_with("https://") {
            return Ok(base_url.trim_end_matches('/').to_string());
        }

        // Relative server URLs resolve against the document URL.
        if let DocLocation::Url(spec_url) = DocLocation::parse(&self.config.spec)? {
            let resolved = spec_url.join(base_url).map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "Invalid base URL '{base_url}': {e} (set R2R_BASE_URL explicitly)"
                ))
            })?;
            return Ok(resolved.as_str().trim_end_matches('/').to_string());
        }

        Err(OpenApiToolsError::OpenApi(format!(
            "Invalid base URL '{base_url}': must be an absolute http(s) URL (set R2R_BASE_URL explicitly)"
        )))
    }

    /// MCP tools for every operation classified as a tool.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        let Some(api) = self.api.read().clone() else {
            return Vec::new();
        };
        api.operations
            .iter()
            .filter(|op| op.kind == CapabilityKind::Tool)
            .map(|op| {
                let mut tool = Tool::new(
                    op.descriptor.name().to_string(),
                    op.description.clone(),
                    Arc::clone(&op.input_schema),
                );
                tool.annotations = Some(op.descriptor.method().annotations(op.title.clone()));
                tool
            })
            .collect()
    }

    /// Static resources (`GET` without path placeholders).
    #[must_use]
    pub fn list_resources(&self) -> Vec<Resource> {
        let Some(api) = self.api.read().clone() else {
            return Vec::new();
        };
        api.operations
            .iter()
            .filter(|op| op.kind == CapabilityKind::Resource)
            .filter_map(|op| {
                let uri = op.uri.clone()?;
                let mut raw = RawResource::new(uri, op.descriptor.name().to_string());
                raw.description = Some(op.description.clone());
                raw.mime_type = Some(JSON_MIME.to_string());
                Some(Annotated::new(raw, None))
            })
            .collect()
    }

    /// Resource templates (`GET` with path placeholders).
    #[must_use]
    pub fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        let Some(api) = self.api.read().clone() else {
            return Vec::new();
        };
        api.operations
            .iter()
            .filter(|op| op.kind == CapabilityKind::ResourceTemplate)
            .filter_map(|op| {
                let template = json!({
                    "uriTemplate": op.uri.clone()?,
                    "name": op.descriptor.name(),
                    "description": op.description,
                    "mimeType": JSON_MIME,
                });
                match serde_json::from_value(template) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        tracing::warn!(name = %op.descriptor.name(), error = %e, "invalid resource template");
                        None
                    }
                }
            })
            .collect()
    }

    /// Execute a tool call.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the tool name is unknown
    /// - required parameters are missing
    /// - the outbound HTTP request fails (transport or non-2xx response)
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult> {
        let api = self.current()?;
        let op = api
            .operations
            .iter()
            .find(|op| op.kind == CapabilityKind::Tool && op.descriptor.name() == name)
            .ok_or_else(|| OpenApiToolsError::UnknownTool(name.to_string()))?;

        let arguments = arguments.unwrap_or_default();
        let body = self.execute(&api, op, &arguments, Vec::new()).await?;

        let content = match body {
            ResponseBody::Binary {
                bytes,
                mime_type: Some(mime_type),
            } if mime_type.starts_with("image/") => Content::image(
                base64::engine::general_purpose::STANDARD.encode(bytes),
                mime_type,
            ),
            other => Content::text(other.into_text()),
        };
        Ok(CallToolResult::success(vec![content]))
    }

    /// Read a generated resource or a concrete URI of a generated template.
    ///
    /// Returns `Ok(None)` when no generated capability owns `uri`.
    ///
    /// # Errors
    ///
    /// Returns an error when the upstream request fails.
    pub async fn read_resource(&self, uri: &str) -> Result<Option<ReadResourceResult>> {
        let api = self.current()?;
        let (base, query) = split_query(uri);

        if let Some(op) = api
            .operations
            .iter()
            .find(|op| op.kind == CapabilityKind::Resource && op.uri.as_deref() == Some(base))
        {
            let body = self.execute(&api, op, &JsonObject::new(), query).await?;
            return Ok(Some(resource_result(uri, body)?));
        }

        for op in api
            .operations
            .iter()
            .filter(|op| op.kind == CapabilityKind::ResourceTemplate)
        {
            let Some(template) = op.uri.as_deref() else {
                continue;
            };
            let Some(vars) = match_template(template, uri) else {
                continue;
            };
            let arguments: JsonObject = vars
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let body = self.execute(&api, op, &arguments, Vec::new()).await?;
            return Ok(Some(resource_result(uri, body)?));
        }

        Ok(None)
    }

    async fn execute(
        &self,
        api: &DiscoveredApi,
        op: &GeneratedOperation,
        arguments: &JsonObject,
        extra_query: Vec<(String, String)>,
    ) -> Result<ResponseBody> {
        let mut parts = build_request_parts(op, arguments)?;
        parts.query.extend(extra_query);
        let url = build_url(&api.base_url, &parts.path, &parts.query)?;

        tracing::debug!(
            operation = %op.descriptor.name(),
            method = %op.descriptor.method(),
            path = %parts.path,
            "calling R2R"
        );

        let mut request = self
            .client
            .request(op.descriptor.method().to_reqwest(), url);
        for (name, value) in parts.headers {
            request = request.header(name, value);
        }
        request = apply_body(request, op.body_encoding, parts.body)?;
        let request = self.credentials.apply(request);

        let response = request.send().await.map_err(HttpToolsError::from)?;
        Ok(expect_success(response).await?)
    }
}

struct GenerationInput<'a> {
    doc: &'a DocLocation,
    path_item_params: &'a [ReferenceOr<Parameter>],
    path: &'a str,
    method: HttpMethod,
    operation: &'a Operation,
}

fn count(operations: &[GeneratedOperation]) -> CapabilityCounts {
    let mut counts = CapabilityCounts::default();
    for op in operations {
        match op.kind {
            CapabilityKind::Tool => counts.tools += 1,
            CapabilityKind::Resource => counts.resources += 1,
            CapabilityKind::ResourceTemplate => counts.resource_templates += 1,
        }
    }
    counts
}

fn resource_result(uri: &str, body: ResponseBody) -> Result<ReadResourceResult> {
    let contents = match body {
        ResponseBody::Binary { bytes, mime_type } => json!({
            "uri": uri,
            "mimeType": mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            "blob": base64::engine::general_purpose::STANDARD.encode(bytes),
        }),
        ResponseBody::Json(value) => json!({
            "uri": uri,
            "mimeType": JSON_MIME,
            "text": serde_json::to_string_pretty(&value)?,
        }),
        ResponseBody::Text { text, mime_type } => json!({
            "uri": uri,
            "mimeType": mime_type.unwrap_or_else(|| "text/plain".to_string()),
            "text": text,
        }),
    };
    let contents: ResourceContents = serde_json::from_value(contents)?;
    Ok(ReadResourceResult {
        contents: vec![contents],
    })
}

// ============================================================================
// Operation generation
// ============================================================================

/// `get_v3_documents_id` style name for operations without an `operationId`.
fn canonical_name(method: HttpMethod, path: &str) -> String {
    let raw = format!("{}_{path}", method.as_str().to_ascii_lowercase());
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    name.trim_matches('_').chars().take(MAX_NAME_LEN).collect()
}

fn reserve_unique_name(names: &mut HashSet<String>, base: &str) -> String {
    if names.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Path-item parameters overridden by operation parameters with the same location and name.
async fn collect_parameters(
    resolver: &RefResolver,
    doc: &DocLocation,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<OperationParameter>> {
    let mut merged: Vec<OperationParameter> = Vec::new();

    for param_ref in path_item_params.iter().chain(operation_params) {
        let located = resolver.resolve(doc, param_ref).await?;
        let location = match &located.item {
            Parameter::Path { .. } => ParamLocation::Path,
            Parameter::Query { .. } => ParamLocation::Query,
            Parameter::Header { .. } => ParamLocation::Header,
            Parameter::Cookie { parameter_data, .. } => {
                tracing::debug!(name = %parameter_data.name, "cookie parameters are not supported");
                continue;
            }
        };
        let data = located.item.parameter_data_ref();

        let mut schema = match &data.format {
            ParameterSchemaOrContent::Schema(schema) => {
                let value = serde_json::to_value(schema)?;
                resolver.inline_schema(&located.doc, value).await
            }
            ParameterSchemaOrContent::Content(_) => json!({"type": "string"}),
        };
        if let (Some(obj), Some(desc)) = (schema.as_object_mut(), &data.description) {
            obj.entry("description")
                .or_insert_with(|| Value::String(desc.clone()));
        }

        let param = OperationParameter {
            name: data.name.clone(),
            wire_name: data.name.clone(),
            location,
            required: location == ParamLocation::Path || data.required,
            schema,
            binary: false,
        };

        match merged
            .iter_mut()
            .find(|p| p.location == param.location && p.wire_name == param.wire_name)
        {
            Some(existing) => *existing = param,
            None => merged.push(param),
        }
    }

    Ok(merged)
}

/// Arguments for the request body: object properties flattened, anything else as `body`.
///
/// A property whose name is already taken by a path/query/header parameter is exposed as
/// `body_<name>`.
async fn body_parameters(
    resolver: &RefResolver,
    doc: &DocLocation,
    body: &RequestBody,
    existing: &[OperationParameter],
) -> Result<Option<(BodyEncoding, Vec<OperationParameter>)>> {
    let Some((encoding, media)) = [JSON_MIME, "multipart/form-data", "application/x-www-form-urlencoded"]
        .iter()
        .find_map(|mt| {
            body.content
                .get(*mt)
                .and_then(|media| BodyEncoding::from_media_type(mt).map(|e| (e, media)))
        })
        .or_else(|| {
            body.content
                .iter()
                .find_map(|(mt, media)| BodyEncoding::from_media_type(mt).map(|e| (e, media)))
        })
    else {
        tracing::debug!("request body has no supported media type");
        return Ok(None);
    };

    let schema = match &media.schema {
        Some(schema) => {
            let value = serde_json::to_value(schema)?;
            resolver.inline_schema(doc, value).await
        }
        None => json!({"type": "object"}),
    };
    let schema = unwrap_single_all_of(schema);

    let taken: HashSet<&str> = existing.iter().map(|p| p.name.as_str()).collect();

    let properties = schema.get("properties").and_then(Value::as_object);
    let Some(properties) = properties.filter(|p| !p.is_empty()) else {
        let name = if taken.contains("body") {
            "request_body"
        } else {
            "body"
        };
        return Ok(Some((
            encoding,
            vec![OperationParameter {
                name: name.to_string(),
                wire_name: "body".to_string(),
                location: ParamLocation::WholeBody,
                required: body.required,
                schema,
                binary: false,
            }],
        )));
    };

    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let params = properties
        .iter()
        .map(|(prop, prop_schema)| {
            let name = if taken.contains(prop.as_str()) {
                format!("body_{prop}")
            } else {
                prop.clone()
            };
            OperationParameter {
                name,
                wire_name: prop.clone(),
                location: ParamLocation::Body,
                required: body.required && required.contains(prop.as_str()),
                schema: prop_schema.clone(),
                binary: is_binary_schema(prop_schema),
            }
        })
        .collect();

    Ok(Some((encoding, params)))
}

fn unwrap_single_all_of(schema: Value) -> Value {
    match schema.get("allOf").and_then(Value::as_array) {
        Some(parts) if parts.len() == 1 && schema.get("properties").is_none() => parts[0].clone(),
        _ => schema,
    }
}

fn is_binary_schema(schema: &Value) -> bool {
    schema.get("format").and_then(Value::as_str) == Some("binary")
        || schema.get("contentMediaType").is_some()
        || schema
            .get("items")
            .is_some_and(|items| items.get("format").and_then(Value::as_str) == Some("binary"))
}

fn build_input_schema(parameters: &[OperationParameter]) -> JsonObject {
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();

    for param in parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), Value::Array(required));
    }
    schema
}

// ============================================================================
// Request construction
// ============================================================================

fn build_request_parts(op: &GeneratedOperation, arguments: &JsonObject) -> Result<RequestParts> {
    let mut parts = RequestParts {
        path: op.descriptor.path().to_string(),
        ..RequestParts::default()
    };
    let mut fields: Vec<(String, Value, bool)> = Vec::new();

    for param in &op.parameters {
        let value = arguments.get(&param.name).filter(|v| !v.is_null());
        let Some(value) = value else {
            if param.required {
                return Err(OpenApiToolsError::Runtime(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
            continue;
        };

        match param.location {
            ParamLocation::Path => {
                let encoded = urlencoding::encode(&value_to_string(value)).into_owned();
                parts.path = parts
                    .path
                    .replace(&format!("{{{}}}", param.wire_name), &encoded);
            }
            ParamLocation::Query => match value {
                Value::Array(items) => parts.query.extend(
                    items
                        .iter()
                        .map(|item| (param.wire_name.clone(), value_to_string(item))),
                ),
                other => parts
                    .query
                    .push((param.wire_name.clone(), value_to_string(other))),
            },
            ParamLocation::Header => parts
                .headers
                .push((param.wire_name.clone(), value_to_string(value))),
            ParamLocation::Body => {
                fields.push((param.wire_name.clone(), value.clone(), param.binary));
            }
            ParamLocation::WholeBody => parts.body = BodyPayload::Whole(value.clone()),
        }
    }

    if !fields.is_empty() {
        parts.body = BodyPayload::Fields(fields);
    }

    if parts.path.contains('{') {
        return Err(OpenApiToolsError::Runtime(format!(
            "Unresolved path parameter in '{}'",
            parts.path
        )));
    }
    if !parts.path.starts_with('/') {
        parts.path.insert(0, '/');
    }

    Ok(parts)
}

fn build_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let mut url = Url::parse(&format!("{}{path}", base_url.trim_end_matches('/')))
        .map_err(|e| OpenApiToolsError::Runtime(format!("Invalid URL: {e}")))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

fn apply_body(
    request: reqwest::RequestBuilder,
    encoding: Option<BodyEncoding>,
    body: BodyPayload,
) -> Result<reqwest::RequestBuilder> {
    let fields: Vec<(String, Value, bool)> = match body {
        BodyPayload::None => return Ok(request),
        BodyPayload::Whole(value) => match (encoding, value) {
            (Some(BodyEncoding::Form | BodyEncoding::Multipart), Value::Object(map)) => map
                .into_iter()
                .map(|(k, v)| (k, v, false))
                .collect(),
            (_, value) => return Ok(request.json(&value)),
        },
        BodyPayload::Fields(fields) => fields,
    };

    match encoding.unwrap_or(BodyEncoding::Json) {
        BodyEncoding::Json => {
            let object: Map<String, Value> = fields.into_iter().map(|(k, v, _)| (k, v)).collect();
            Ok(request.json(&object))
        }
        BodyEncoding::Form => {
            let pairs: Vec<(String, String)> = fields
                .iter()
                .map(|(k, v, _)| (k.clone(), value_to_string(v)))
                .collect();
            Ok(request.form(&pairs))
        }
        BodyEncoding::Multipart => {
            let mut form = reqwest::multipart::Form::new();
            for (name, value, binary) in fields {
                if binary {
                    let part = reqwest::multipart::Part::bytes(value_to_string(&value).into_bytes())
                        .file_name(name.clone());
                    form = form.part(name, part);
                } else {
                    form = form.text(name, value_to_string(&value));
                }
            }
            Ok(request.multipart(form))
        }
    }
}

/// Convert a JSON value to a string for URL, header and form parameters.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::config::{AutoDiscoverConfig, RouteMapConfig};
    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::{Path, RawQuery};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use r2r_mcp_env::{StaticSettings, vars};

    const R2R_SPEC: &str = r##"
openapi: "3.1.0"
info:
  title: R2R Application API
  version: "3.5.0"
servers:
  - url: http://r2r.invalid
components:
  parameters:
    Limit:
      name: limit
      in: query
      required: false
      schema:
        type: integer
        exclusiveMinimum: 0
  schemas:
    SearchSettings:
      type: object
      properties:
        limit:
          type: integer
        use_hybrid_search:
          type: boolean
    SearchBody:
      type: object
      required: [query]
      properties:
        query:
          type: string
        search_settings:
          $ref: "#/components/schemas/SearchSettings"
paths:
  /v3/documents:
    get:
      operationId: list_documents
      summary: List documents
      parameters:
        - $ref: "#/components/parameters/Limit"
      responses:
        "200": {description: ok}
    post:
      operationId: create_document
      summary: Create a document
      requestBody:
        required: true
        content:
          multipart/form-data:
            schema:
              type: object
              properties:
                file:
                  type: string
                  format: binary
                metadata:
                  type: string
      responses:
        "200": {description: ok}
  /v3/documents/{id}:
    parameters:
      - name: id
        in: path
        required: true
        schema: {type: string, format: uuid}
    get:
      operationId: get_document
      summary: Get a document
      responses:
        "200": {description: ok}
    delete:
      operationId: delete_document
      responses:
        "200": {description: ok}
  /v3/documents/{id}/chunks:
    get:
      parameters:
        - name: id
          in: path
          required: true
          schema: {type: string}
        - $ref: "#/components/parameters/Limit"
      responses:
        "200": {description: ok}
  /v3/retrieval/search:
    post:
      operationId: search
      description: Perform a search
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/SearchBody"
      responses:
        "200": {description: ok}
  /v3/collections/{id}:
    post:
      operationId: update_collection
      parameters:
        - name: id
          in: path
          required: true
          schema: {type: string}
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                id: {type: string}
                name: {type: string}
      responses:
        "200": {description: ok}
  /v3/chunks/{id}/metadata:
    put:
      operationId: replace_metadata
      parameters:
        - name: id
          in: path
          required: true
          schema: {type: string}
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: array
              items: {type: object}
      responses:
        "200": {description: ok}
  /health:
    get:
      responses:
        "200": {description: ok}
    head:
      responses:
        "200": {description: ok}
"##;

    fn config(base_url: &str) -> ApiServerConfig {
        ApiServerConfig::new("inline-openapi.yaml").with_base_url(base_url)
    }

    async fn started(cfg: ApiServerConfig, settings: &StaticSettings) -> OpenApiCapabilitySource {
        let source =
            OpenApiCapabilitySource::new(cfg, CredentialResolver::new(Arc::new(settings.clone())))
                .expect("source");
        source.start_from_str(R2R_SPEC).await.expect("start");
        source
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .expect("text content")
    }

    #[tokio::test]
    async fn discovery_classifies_every_supported_operation() {
        let source = started(config("http://r2r.invalid"), &StaticSettings::new()).await;

        let regs = source.registrations();
        let by_name = |name: &str| {
            regs.iter()
                .find(|r| r.descriptor.name() == name)
                .cloned()
                .unwrap_or_else(|| panic!("missing {name}"))
        };

        assert_eq!(by_name("list_documents").kind, CapabilityKind::Resource);
        assert_eq!(
            by_name("list_documents").uri.as_deref(),
            Some("r2r://api/v3/documents")
        );
        assert_eq!(by_name("get_document").kind, CapabilityKind::ResourceTemplate);
        assert_eq!(by_name("delete_document").kind, CapabilityKind::Tool);
        assert_eq!(by_name("create_document").kind, CapabilityKind::Tool);
        assert_eq!(by_name("search").kind, CapabilityKind::Tool);
        assert_eq!(
            by_name("get_v3_documents_id_chunks").uri.as_deref(),
            Some("r2r://api/v3/documents/{id}/chunks{?limit}")
        );
        assert_eq!(by_name("get_health").kind, CapabilityKind::Resource);

        // HEAD is never published.
        assert_eq!(regs.len(), 9);
        for reg in &regs {
            assert_eq!(reg.kind, classify(&reg.descriptor));
        }

        let counts = source.counts();
        assert_eq!(
            counts,
            CapabilityCounts {
                tools: 5,
                resources: 2,
                resource_templates: 2
            }
        );
        assert_eq!(counts.total(), 9);

        let info = source.spec_info().expect("info");
        assert_eq!(info.title, "R2R Application API");
        assert_eq!(info.total_operations, 9);
        assert_eq!(source.list_tools().len(), 5);
        assert_eq!(source.list_resources().len(), 2);
        assert_eq!(source.list_resource_templates().len(), 2);
    }

    #[tokio::test]
    async fn tool_schemas_flatten_bodies_and_carry_annotations() {
        let source = started(config("http://r2r.invalid"), &StaticSettings::new()).await;
        let tools = source.list_tools();
        let tool = |name: &str| {
            tools
                .iter()
                .find(|t| t.name == name)
                .cloned()
                .unwrap_or_else(|| panic!("missing {name}"))
        };

        let search = tool("search");
        assert_eq!(search.description.as_deref(), Some("Perform a search"));
        let props = search.input_schema["properties"].as_object().expect("props");
        assert_eq!(
            props["search_settings"]["properties"]["use_hybrid_search"]["type"],
            "boolean"
        );
        assert_eq!(search.input_schema["required"], json!(["query"]));
        let annotations = search.annotations.expect("annotations");
        assert_eq!(annotations.read_only_hint, Some(false));

        let delete = tool("delete_document");
        assert_eq!(delete.input_schema["properties"]["id"]["format"], "uuid");
        assert_eq!(
            delete.annotations.expect("annotations").destructive_hint,
            Some(true)
        );

        // `id` collides with the path parameter.
        let update = tool("update_collection");
        let props = update.input_schema["properties"].as_object().expect("props");
        assert!(props.contains_key("id"));
        assert!(props.contains_key("body_id"));
        assert!(props.contains_key("name"));
        assert_eq!(update.input_schema["required"], json!(["id"]));

        let replace = tool("replace_metadata");
        assert_eq!(replace.input_schema["properties"]["body"]["type"], "array");
    }

    #[tokio::test]
    async fn auto_discover_and_custom_route_maps() {
        let mut cfg = config("http://r2r.invalid");
        cfg.auto_discover = AutoDiscoverConfig::Detailed {
            include: vec![],
            exclude: vec!["DELETE *".into(), "GET /health".into()],
        };
        cfg.route_maps = vec![RouteMapConfig {
            methods: vec!["GET".into()],
            pattern: "^/v3/documents$".into(),
            kind: CapabilityKind::Tool,
            description: None,
        }];
        let source = started(cfg, &StaticSettings::new()).await;

        let regs = source.registrations();
        assert!(regs.iter().all(|r| r.descriptor.method() != HttpMethod::Delete));
        assert!(regs.iter().all(|r| r.descriptor.path() != "/health"));
        let list = regs
            .iter()
            .find(|r| r.descriptor.name() == "list_documents")
            .expect("list_documents");
        assert_eq!(list.kind, CapabilityKind::Tool);
        assert_eq!(source.route_maps().len(), 4);
        assert_eq!(source.route_maps()[0].kind, CapabilityKind::Tool);
    }

    #[tokio::test]
    async fn call_tool_sends_json_body_with_fresh_credentials() {
        let app = Router::new().route(
            "/v3/retrieval/search",
            post(|headers: HeaderMap, body: Bytes| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body: Value = serde_json::from_slice(&body).expect("json body");
                axum::Json(json!({"auth": auth, "body": body}))
            }),
        );
        let base = spawn(app).await;
        let settings = StaticSettings::new();
        let source = started(config(&base), &settings).await;

        let mut args = JsonObject::new();
        args.insert("query".into(), json!("what is rag"));
        args.insert("search_settings".into(), json!({"limit": 3}));

        let result = source
            .call_tool("search", Some(args.clone()))
            .await
            .expect("call");
        let echoed: Value = serde_json::from_str(&text_of(&result)).expect("json");
        assert_eq!(echoed["auth"], Value::Null);
        assert_eq!(echoed["body"]["query"], "what is rag");
        assert_eq!(echoed["body"]["search_settings"]["limit"], 3);

        settings.set(vars::API_KEY, "abc123");
        let result = source.call_tool("search", Some(args)).await.expect("call");
        let echoed: Value = serde_json::from_str(&text_of(&result)).expect("json");
        assert_eq!(echoed["auth"], "Bearer abc123");
    }

    #[tokio::test]
    async fn call_tool_errors() {
        let app = Router::new().route(
            "/v3/documents/{id}",
            axum::routing::delete(|Path(id): Path<String>| async move {
                (StatusCode::NOT_FOUND, format!("document {id} not found"))
            }),
        );
        let base = spawn(app).await;
        let source = started(config(&base), &StaticSettings::new()).await;

        let err = source.call_tool("nope", None).await.expect_err("unknown");
        assert!(matches!(err, OpenApiToolsError::UnknownTool(_)));

        let err = source
            .call_tool("search", None)
            .await
            .expect_err("missing query");
        assert!(err.to_string().contains("Missing required parameter: query"));

        let mut args = JsonObject::new();
        args.insert("id".into(), json!("a b"));
        let err = source
            .call_tool("delete_document", Some(args))
            .await
            .expect_err("404");
        assert_eq!(err.upstream_status(), Some(404));
        assert!(err.to_string().contains("document a b not found"));
    }

    #[tokio::test]
    async fn multipart_bodies_send_binary_fields_as_files() {
        let app = Router::new().route(
            "/v3/documents",
            post(|headers: HeaderMap, body: Bytes| async move {
                let ct = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let body = String::from_utf8_lossy(&body).to_string();
                axum::Json(json!({"content_type": ct, "raw": body}))
            }),
        );
        let base = spawn(app).await;
        let source = started(config(&base), &StaticSettings::new()).await;

        let mut args = JsonObject::new();
        args.insert("file".into(), json!("hello world"));
        args.insert("metadata".into(), json!("{\"title\":\"t\"}"));
        let result = source
            .call_tool("create_document", Some(args))
            .await
            .expect("call");
        let echoed: Value = serde_json::from_str(&text_of(&result)).expect("json");
        assert!(
            echoed["content_type"]
                .as_str()
                .is_some_and(|ct| ct.starts_with("multipart/form-data"))
        );
        let raw = echoed["raw"].as_str().expect("raw");
        assert!(raw.contains("filename=\"file\""));
        assert!(raw.contains("hello world"));
        assert!(raw.contains("name=\"metadata\""));
    }

    #[tokio::test]
    async fn read_resource_and_templates() {
        let app = Router::new()
            .route(
                "/v3/documents",
                get(|RawQuery(q): RawQuery| async move { axum::Json(json!({"query": q})) }),
            )
            .route(
                "/v3/documents/{id}",
                get(|Path(id): Path<String>| async move { axum::Json(json!({"id": id})) }),
            )
            .route(
                "/v3/documents/{id}/chunks",
                get(
                    |Path(id): Path<String>, RawQuery(q): RawQuery| async move {
                        axum::Json(json!({"id": id, "query": q}))
                    },
                ),
            );
        let base = spawn(app).await;
        let source = started(config(&base), &StaticSettings::new()).await;

        let result = source
            .read_resource("r2r://api/v3/documents?limit=5")
            .await
            .expect("read")
            .expect("owned");
        let json = serde_json::to_value(&result).expect("json");
        assert_eq!(json["contents"][0]["mimeType"], JSON_MIME);
        let text: Value =
            serde_json::from_str(json["contents"][0]["text"].as_str().expect("text")).expect("json");
        assert_eq!(text["query"], "limit=5");

        let result = source
            .read_resource("r2r://api/v3/documents/doc-1")
            .await
            .expect("read")
            .expect("owned");
        let json = serde_json::to_value(&result).expect("json");
        assert_eq!(json["contents"][0]["uri"], "r2r://api/v3/documents/doc-1");
        assert!(json["contents"][0]["text"].as_str().expect("text").contains("doc-1"));

        let result = source
            .read_resource("r2r://api/v3/documents/d2/chunks?limit=2")
            .await
            .expect("read")
            .expect("owned");
        let json = serde_json::to_value(&result).expect("json");
        let text: Value =
            serde_json::from_str(json["contents"][0]["text"].as_str().expect("text")).expect("json");
        assert_eq!(text["id"], "d2");
        assert_eq!(text["query"], "limit=2");

        assert!(
            source
                .read_resource("r2r://server/info")
                .await
                .expect("read")
                .is_none()
        );
    }

    #[tokio::test]
    async fn base_url_falls_back_to_servers_and_resolves_relative_urls() {
        let source = OpenApiCapabilitySource::new(
            ApiServerConfig::new("inline-openapi.yaml"),
            CredentialResolver::new(Arc::new(StaticSettings::new())),
        )
        .expect("source");
        source.start_from_str(R2R_SPEC).await.expect("start");
        assert_eq!(source.base_url().as_deref(), Some("http://r2r.invalid"));

        let source = OpenApiCapabilitySource::new(
            ApiServerConfig::new("http://localhost:7272/openapi.json"),
            CredentialResolver::new(Arc::new(StaticSettings::new())),
        )
        .expect("source");
        assert_eq!(
            source.resolve_base_url("/api").expect("relative"),
            "http://localhost:7272/api"
        );

        let source = OpenApiCapabilitySource::new(
            ApiServerConfig::new("spec.yaml"),
            CredentialResolver::new(Arc::new(StaticSettings::new())),
        )
        .expect("source");
        assert!(source.resolve_base_url("/api").is_err());
    }

    #[tokio::test]
    async fn start_loads_document_over_http() {
        let app = Router::new().route("/openapi.json", get(|| async { R2R_SPEC }));
        let base = spawn(app).await;
        let cfg = ApiServerConfig::new(format!("{base}/openapi.json")).with_base_url(&base);
        let source = OpenApiCapabilitySource::new(
            cfg,
            CredentialResolver::new(Arc::new(StaticSettings::new())),
        )
        .expect("source");

        assert!(!source.is_started());
        assert!(source.call_tool("search", None).await.is_err());
        source.start().await.expect("start");
        assert!(source.is_started());
        assert_eq!(source.base_url(), Some(base));
    }

    #[test]
    fn canonical_names() {
        assert_eq!(
            canonical_name(HttpMethod::Get, "/v3/documents/{id}/chunks"),
            "get_v3_documents_id_chunks"
        );
        assert_eq!(canonical_name(HttpMethod::Delete, "/"), "delete");

        let mut names = HashSet::new();
        assert_eq!(reserve_unique_name(&mut names, "search"), "search");
        assert_eq!(reserve_unique_name(&mut names, "search"), "search_1");
        assert_eq!(reserve_unique_name(&mut names, "search"), "search_2");
    }

    #[test]
    fn query_arrays_repeat_and_paths_encode() {
        let op = GeneratedOperation {
            descriptor: OperationDescriptor::new(HttpMethod::Get, "/v3/documents/{id}", "get")
                .expect("descriptor"),
            kind: CapabilityKind::ResourceTemplate,
            title: None,
            description: String::new(),
            parameters: vec![
                OperationParameter {
                    name: "id".into(),
                    wire_name: "id".into(),
                    location: ParamLocation::Path,
                    required: true,
                    schema: json!({}),
                    binary: false,
                },
                OperationParameter {
                    name: "ids".into(),
                    wire_name: "ids".into(),
                    location: ParamLocation::Query,
                    required: false,
                    schema: json!({}),
                    binary: false,
                },
            ],
            body_encoding: None,
            input_schema: Arc::new(JsonObject::new()),
            uri: None,
        };

        let mut args = JsonObject::new();
        args.insert("id".into(), json!("a/b"));
        args.insert("ids".into(), json!(["x", 2]));
        let parts = build_request_parts(&op, &args).expect("parts");
        assert_eq!(parts.path, "/v3/documents/a%2Fb");
        assert_eq!(
            parts.query,
            vec![("ids".into(), "x".into()), ("ids".into(), "2".into())]
        );

        let url = build_url("http://h/", &parts.path, &parts.query).expect("url");
        assert_eq!(url.as_str(), "http://h/v3/documents/a%2Fb?ids=x&ids=2");
        let url = build_url("http://h", "/x", &[]).expect("url");
        assert_eq!(url.query(), None);

        let mut args = JsonObject::new();
        args.insert("id".into(), Value::Null);
        assert!(build_request_parts(&op, &args).is_err());
    }
}
