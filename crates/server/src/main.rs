use anyhow::Context as _;
use clap::Parser as _;
use r2r_mcp_http_tools::CredentialResolver;
use r2r_mcp_server::{AppState, Cli, R2rMcpServer, Transport, transport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli);

    let settings = cli.settings().context("invalid configuration")?;
    tracing::info!(
        base_url = %settings.base_url,
        openapi_url = %settings.openapi_url,
        transport = ?cli.transport,
        "starting R2R MCP server"
    );

    let state = AppState::start(settings, CredentialResolver::from_env())
        .await
        .context("server startup failed")?;
    let counts = state.source.counts();
    tracing::info!(
        tools = counts.tools,
        resources = counts.resources,
        resource_templates = counts.resource_templates,
        "OpenAPI capabilities registered"
    );

    let server = R2rMcpServer::new(Arc::new(state));
    match cli.transport {
        Transport::Stdio => transport::serve_stdio(server).await,
        Transport::Http => transport::serve_http(server, cli.bind, CancellationToken::new()).await,
    }
}

// stdout belongs to the stdio transport; logs always go to stderr.
fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
