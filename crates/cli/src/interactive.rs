//! Line-oriented prompt: `search <q>`, `rag <q>`, `quit`.

use crate::output::{Palette, rule};
use crate::search;
use r2r_mcp_client::R2rClient;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Rag(String),
    Quit,
    Empty,
    MissingQuery,
    Unknown(String),
}

impl Command {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q") {
            return Self::Quit;
        }
        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
            None => (line.to_lowercase(), ""),
        };
        if rest.is_empty() {
            return Self::MissingQuery;
        }
        match cmd.as_str() {
            "search" => Self::Search(rest.to_string()),
            "rag" => Self::Rag(rest.to_string()),
            _ => Self::Unknown(cmd),
        }
    }
}

fn banner(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "R2R Interactive Search")?;
    writeln!(out, "{}", rule())?;
    writeln!(out, "Commands:")?;
    writeln!(out, "  search <query>  - Search knowledge base")?;
    writeln!(out, "  rag <query>     - Ask a question (RAG)")?;
    writeln!(out, "  quit / exit     - Exit")?;
    writeln!(out, "{}", rule())?;
    writeln!(out)
}

/// Read commands from `input` until `quit` or end of input.
///
/// A failing search or RAG call is reported and the prompt continues.
///
/// # Errors
///
/// Returns an error if reading `input` or writing `out` fails.
pub async fn run(
    client: &R2rClient,
    input: impl AsyncBufRead + Unpin,
    palette: Palette,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    banner(out)?;
    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };

        let outcome = match Command::parse(&line) {
            Command::Empty => continue,
            Command::Quit => {
                writeln!(out, "Goodbye!")?;
                break;
            }
            Command::MissingQuery => {
                writeln!(out, "{}", palette.error("Usage: <command> <query>"))?;
                continue;
            }
            Command::Unknown(cmd) => {
                writeln!(out, "{}", palette.error(&format!("Unknown command: {cmd}")))?;
                writeln!(out, "Available commands: search, rag, quit")?;
                continue;
            }
            Command::Search(query) => {
                search::search(client, &query, search::DEFAULT_LIMIT, false, palette, out).await
            }
            Command::Rag(query) => {
                search::rag(client, &query, search::DEFAULT_MAX_TOKENS, palette, out).await
            }
        };
        if let Err(e) = outcome {
            tracing::debug!(error = %e, "interactive command failed");
            writeln!(out, "{}", palette.error(&format!("Request failed: {e}")))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(Command::parse("EXIT"), Command::Quit);
        assert_eq!(Command::parse("q"), Command::Quit);
        assert_eq!(
            Command::parse("search  vector databases "),
            Command::Search("vector databases".into())
        );
        assert_eq!(Command::parse("RAG why?"), Command::Rag("why?".into()));
        assert_eq!(Command::parse("search"), Command::MissingQuery);
        assert_eq!(Command::parse("find x"), Command::Unknown("find".into()));
    }
}
