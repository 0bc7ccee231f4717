use clap::{Parser, Subcommand};
use r2r_mcp_cli::{Palette, connect, ingest, interactive, search};
use r2r_mcp_env::vars;
use r2r_mcp_http_tools::CredentialResolver;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "r2r", version, about = "Search and ingest against an R2R deployment")]
struct Cli {
    /// Base URL of the R2R deployment.
    #[arg(long, global = true, env = vars::BASE_URL, default_value = "http://localhost:7272")]
    base_url: String,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Search the knowledge base, ask a question, or start the interactive prompt.
    Search {
        /// Query text; without it the interactive prompt starts.
        query: Option<String>,
        #[arg(long, default_value_t = search::DEFAULT_LIMIT)]
        limit: u32,
        /// Answer with RAG instead of listing passages.
        #[arg(long)]
        rag: bool,
        #[arg(long, default_value_t = search::DEFAULT_MAX_TOKENS)]
        max_tokens: u32,
        /// Print the raw search response as JSON.
        #[arg(long)]
        json: bool,
        #[arg(short, long)]
        interactive: bool,
    },
    /// Upload every file in a directory matching a glob pattern.
    Ingest {
        directory: PathBuf,
        #[arg(long, default_value = ingest::DEFAULT_PATTERN)]
        pattern: String,
        /// Collection to add each uploaded document to.
        #[arg(long)]
        collection: Option<String>,
        /// List the matching files without uploading.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let palette = if cli.no_color {
        Palette::new(false)
    } else {
        Palette::for_stdout()
    };
    let mut out = std::io::stdout().lock();

    match cli.cmd {
        Cmd::Search {
            query,
            limit,
            rag,
            max_tokens,
            json,
            interactive,
        } => {
            let client = connect(&cli.base_url, CredentialResolver::from_env(), palette, &mut out)?;
            match query {
                Some(query) if !interactive => {
                    if rag {
                        search::rag(&client, &query, max_tokens, palette, &mut out).await?;
                    } else {
                        search::search(&client, &query, limit, json, palette, &mut out).await?;
                    }
                }
                _ => {
                    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                    interactive::run(&client, stdin, palette, &mut out).await?;
                }
            }
        }
        Cmd::Ingest {
            directory,
            pattern,
            collection,
            dry_run,
        } => {
            if dry_run {
                let files = ingest::find_files(&directory, &pattern)?;
                ingest::dry_run(&files, &mut out)?;
                return Ok(());
            }
            let client = connect(&cli.base_url, CredentialResolver::from_env(), palette, &mut out)?;
            ingest::ingest(
                &client,
                &directory,
                &pattern,
                collection.as_deref(),
                palette,
                &mut out,
            )
            .await?;
        }
    }
    Ok(())
}
