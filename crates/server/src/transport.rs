//! Serving the handler over stdio or streamable HTTP.

use crate::handler::R2rMcpServer;
use anyhow::Context as _;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rmcp::ServiceExt as _;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Serve one session over stdin/stdout until the client disconnects.
///
/// # Errors
///
/// Returns an error if the MCP handshake fails or the transport breaks.
pub async fn serve_stdio(server: R2rMcpServer) -> anyhow::Result<()> {
    tracing::info!("serving MCP over stdio");
    let running = server
        .serve(rmcp::transport::stdio())
        .await
        .context("MCP stdio handshake failed")?;
    running.waiting().await.context("MCP stdio session failed")?;
    Ok(())
}

/// Routes: `/mcp` (streamable HTTP), `/health`, and `/map` (classification table).
pub fn router(server: R2rMcpServer) -> Router {
    let factory = server.clone();
    let mcp = StreamableHttpService::new(
        move || Ok(factory.for_session()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    Router::new()
        .route("/health", get(health))
        .route("/map", get(map))
        .with_state(server)
        .nest_service("/mcp", mcp)
}

async fn health(State(server): State<R2rMcpServer>) -> Json<Value> {
    let state = server.state();
    Json(json!({
        "status": "ok",
        "openapi_loaded": state.source.is_started(),
        "auth_configured": state.credentials.is_configured(),
    }))
}

async fn map(State(server): State<R2rMcpServer>) -> Json<Value> {
    let state = server.state();
    Json(json!({
        "route_maps": state.source.route_maps(),
        "counts": state.source.counts(),
        "operations": state.source.registrations(),
    }))
}

/// Serve HTTP on `bind` until ctrl-c or `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve_http(
    server: R2rMcpServer,
    bind: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "serving MCP over streamable HTTP at /mcp");

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            ctrl_c.cancel();
        }
    });

    axum::serve(listener, router(server))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;
    tracing::info!("HTTP server stopped");
    Ok(())
}
