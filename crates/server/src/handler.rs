//! The MCP server: generated `OpenAPI` capabilities plus the built-in resources, prompts and
//! enhanced tools, behind one rmcp [`ServerHandler`].

use crate::config::ServerSettings;
use crate::context::ToolContext;
use crate::error::{Result, ServerError};
use crate::peer::{LogThreshold, McpPeer, progress_token};
use crate::pipelines::StepCache;
use crate::{prompts, resources, tools};
use r2r_mcp_client::R2rClient;
use r2r_mcp_http_tools::CredentialResolver;
use r2r_mcp_openapi_tools::{OpenApiCapabilitySource, OpenApiToolsError};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, GetPromptRequestParams, GetPromptResult,
    JsonObject, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
    ListToolsResult, PaginatedRequestParams, ReadResourceRequestParams, ReadResourceResult,
    Resource, ResourceTemplate, ServerCapabilities, ServerInfo, SetLevelRequestParams, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler};
use std::sync::Arc;

const INSTRUCTIONS: &str = "Access the R2R retrieval API. Generated tools, resources and resource \
templates mirror the R2R v3 endpoints; r2r://server/info and r2r://server/routes describe the \
server. The enhanced tools (enhanced_search, research_pipeline, ...) combine search with LLM \
sampling on the client.";

/// Everything a request needs, shared by every session.
pub struct AppState {
    pub settings: ServerSettings,
    pub source: OpenApiCapabilitySource,
    pub client: R2rClient,
    pub credentials: CredentialResolver,
    /// Search results reused by research pipelines, keyed by query and limit.
    pub search_cache: StepCache,
}

impl AppState {
    /// Load the `OpenAPI` document and build the R2R client.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Startup`] when the document cannot be loaded, and configuration
    /// errors for unusable URLs or route maps.
    pub async fn start(settings: ServerSettings, credentials: CredentialResolver) -> Result<Self> {
        let source = OpenApiCapabilitySource::new(settings.api.clone(), credentials.clone())?;
        source.start().await.map_err(|e| {
            ServerError::Startup(format!(
                "failed to load OpenAPI document from {}: {e}",
                settings.openapi_url
            ))
        })?;
        let client = R2rClient::new(&settings.base_url, credentials.clone())?;

        if !credentials.is_configured() {
            tracing::warn!(
                key = credentials.key(),
                "no R2R API key configured; requests will be sent without authentication"
            );
        }

        Ok(Self {
            settings,
            source,
            client,
            credentials,
            search_cache: StepCache::default(),
        })
    }
}

#[derive(Clone)]
pub struct R2rMcpServer {
    state: Arc<AppState>,
    log_threshold: LogThreshold,
}

impl R2rMcpServer {
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            log_threshold: LogThreshold::default(),
        }
    }

    /// A handler for a new session: same state, its own log level.
    #[must_use]
    pub fn for_session(&self) -> Self {
        Self::new(Arc::clone(&self.state))
    }

    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Enhanced tools first, then the generated ones.
    #[must_use]
    pub fn all_tools(&self) -> Vec<Tool> {
        let mut all = tools::list_tools();
        all.extend(
            self.state
                .source
                .list_tools()
                .into_iter()
                .filter(|t| !tools::is_enhanced(&t.name)),
        );
        all
    }

    #[must_use]
    pub fn all_resources(&self) -> Vec<Resource> {
        let mut all = resources::list_resources();
        all.extend(self.state.source.list_resources());
        all
    }

    /// # Errors
    ///
    /// Fails only if the built-in template definitions cannot be built.
    pub fn all_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        let mut all = resources::list_resource_templates()?;
        all.extend(self.state.source.list_resource_templates());
        Ok(all)
    }

    /// Run a tool. Upstream failures of generated tools come back as error results; unknown tools
    /// and bad arguments are protocol errors.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown tools or invalid arguments.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        ctx: &ToolContext,
    ) -> Result<CallToolResult> {
        if tools::is_enhanced(name) {
            let state = &self.state;
            return tools::call(&state.client, &state.search_cache, ctx, name, arguments).await;
        }

        match self.state.source.call_tool(name, arguments).await {
            Ok(result) => Ok(result),
            Err(OpenApiToolsError::UnknownTool(name)) => {
                Err(ServerError::InvalidArguments(format!("unknown tool: {name}")))
            }
            Err(e) => {
                let e = ServerError::from(e);
                if e.is_invalid_input() {
                    return Err(e);
                }
                tracing::warn!(tool = %name, error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }

    /// Built-ins, then generated resources and templates.
    ///
    /// # Errors
    ///
    /// Returns `resource_not_found` for unknown URIs and `internal_error` when reading a
    /// generated resource fails upstream.
    pub async fn read(&self, uri: &str) -> std::result::Result<ReadResourceResult, ErrorData> {
        if let Some(result) = resources::read(&self.state, uri).await? {
            return Ok(result);
        }
        match self.state.source.read_resource(uri).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(ErrorData::resource_not_found(
                format!("unknown resource: {uri}"),
                None,
            )),
            Err(e) => {
                tracing::warn!(%uri, error = %e, "resource read failed");
                Err(ErrorData::internal_error(e.to_string(), None))
            }
        }
    }

    fn tool_context(&self, context: &RequestContext<RoleServer>) -> ToolContext {
        let peer = Arc::new(McpPeer::new(
            context.peer.clone(),
            progress_token(&context.meta),
            self.log_threshold.clone(),
        ));
        ToolContext::new(peer.clone(), peer)
    }
}

impl ServerHandler for R2rMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder()
            .enable_tools()
            .enable_resources()
            .enable_prompts()
            .enable_logging()
            .build();
        info.server_info.name = resources::SERVER_NAME.to_string();
        info.server_info.version = env!("CARGO_PKG_VERSION").to_string();
        info.instructions = Some(INSTRUCTIONS.to_string());
        info
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.all_tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let ctx = self.tool_context(&context);
        tracing::debug!(tool = %request.name, "tools/call");
        Ok(self.call(&request.name, request.arguments, &ctx).await?)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult::with_all_items(self.all_resources()))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourceTemplatesResult, ErrorData> {
        Ok(ListResourceTemplatesResult::with_all_items(
            self.all_resource_templates()?,
        ))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ReadResourceResult, ErrorData> {
        self.read(&request.uri).await
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListPromptsResult, ErrorData> {
        Ok(ListPromptsResult::with_all_items(prompts::list_prompts()?))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<GetPromptResult, ErrorData> {
        Ok(prompts::get_prompt(&request.name, request.arguments.as_ref())?)
    }

    async fn set_level(
        &self,
        request: SetLevelRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        tracing::debug!(level = ?request.level, "logging/setLevel");
        self.log_threshold.set(request.level);
        Ok(())
    }
}
