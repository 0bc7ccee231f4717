//! Terminal front end for R2R: one-shot search and RAG, an interactive prompt, and batch ingest.
//!
//! Every command writes to a caller-supplied [`std::io::Write`] so output can be captured.

pub mod ingest;
pub mod interactive;
pub mod output;
pub mod search;

use r2r_mcp_client::R2rClient;
use r2r_mcp_env::vars;
use r2r_mcp_http_tools::CredentialResolver;

pub use output::Palette;

/// Build a client for `base_url`, warning on `out` when no API key is set.
///
/// # Errors
///
/// Returns an error if `base_url` is not a usable URL.
pub fn connect(
    base_url: &str,
    credentials: CredentialResolver,
    palette: Palette,
    out: &mut impl std::io::Write,
) -> anyhow::Result<R2rClient> {
    if !credentials.is_configured() {
        writeln!(
            out,
            "{}",
            palette.warn(&format!("Warning: {} not set", vars::API_KEY))
        )?;
    }
    Ok(R2rClient::new(base_url, credentials)?)
}
