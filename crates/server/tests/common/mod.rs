use anyhow::Context as _;
use r2r_mcp_test_support::MockR2r;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

pub use r2r_mcp_test_support::KillOnDrop;

pub const TEST_API_KEY: &str = "test-key";

pub fn pick_unused_port() -> anyhow::Result<u16> {
    r2r_mcp_test_support::pick_unused_port()
}

pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    r2r_mcp_test_support::wait_http_ok(url, timeout_dur).await
}

fn server_command(mock: &MockR2r) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_r2r-mcp-server"));
    cmd.env("R2R_BASE_URL", mock.base_url())
        .env("R2R_API_KEY", TEST_API_KEY)
        .env_remove("R2R_OPENAPI_URL")
        .env_remove("R2R_MCP_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--log-level")
        .arg("info");
    cmd
}

/// Spawn the server binary on the HTTP transport, pointed at `mock`.
pub fn spawn_http_server(mock: &MockR2r, port: u16) -> anyhow::Result<Child> {
    server_command(mock)
        .arg("--transport")
        .arg("http")
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .spawn()
        .context("spawn r2r-mcp-server")
}

/// Spawn the server binary on stdio with piped stdin/stdout.
#[allow(dead_code)]
pub fn spawn_stdio_server(mock: &MockR2r) -> anyhow::Result<Child> {
    server_command(mock)
        .arg("--transport")
        .arg("stdio")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .context("spawn r2r-mcp-server")
}
