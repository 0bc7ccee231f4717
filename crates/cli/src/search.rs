//! One-shot search and RAG rendering.

use crate::output::{Palette, rule};
use r2r_mcp_client::format::truncate_chars;
use r2r_mcp_client::{R2rClient, RagGenerationConfig, RagResponse, SearchResponse, SearchSettings};
use std::io::Write;

pub const DEFAULT_LIMIT: u32 = 5;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

const PREVIEW_CHARS: usize = 300;
const DOC_ID_CHARS: usize = 8;
const SHOWN_CITATIONS: usize = 3;
const CITATION_CHARS: usize = 100;

/// Run a search and print it, either as ranked passages or as raw JSON.
///
/// # Errors
///
/// Returns an error if the search fails or `out` cannot be written.
pub async fn search(
    client: &R2rClient,
    query: &str,
    limit: u32,
    json: bool,
    palette: Palette,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    writeln!(out, "{}", palette.heading(&format!("Searching for: '{query}'")))?;
    writeln!(out)?;
    let response = client
        .search(query, SearchSettings::default().with_limit(limit))
        .await?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;
        return Ok(());
    }
    render_search(&response, palette, out)
}

/// Print ranked passages, each under a header with score and a short document id.
///
/// # Errors
///
/// Returns an error if `out` cannot be written.
pub fn render_search(
    response: &SearchResponse,
    palette: Palette,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let chunks = response.chunks();
    if chunks.is_empty() {
        writeln!(out, "{}", palette.error("No results found"))?;
        return Ok(());
    }

    writeln!(out, "{}", palette.ok(&format!("Found {} results:", chunks.len())))?;
    writeln!(out)?;
    for (i, chunk) in chunks.iter().enumerate() {
        let doc_id = chunk.document_id.as_deref().unwrap_or("N/A");
        writeln!(out, "{}", rule())?;
        writeln!(
            out,
            "Result {} | Score: {:.3} | Document: {}...",
            i + 1,
            chunk.score.unwrap_or_default(),
            truncate_chars(doc_id, DOC_ID_CHARS)
        )?;
        writeln!(out, "{}", rule())?;
        let preview = truncate_chars(&chunk.text, PREVIEW_CHARS);
        writeln!(out, "{preview}")?;
        if preview.len() < chunk.text.len() {
            writeln!(out, "...")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Ask a question and print the generated answer with up to three sources.
///
/// # Errors
///
/// Returns an error if the RAG call fails or `out` cannot be written.
pub async fn rag(
    client: &R2rClient,
    query: &str,
    max_tokens: u32,
    palette: Palette,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    writeln!(out, "{}", palette.heading(&format!("Asking: '{query}'")))?;
    writeln!(out)?;
    let response = client
        .rag(
            query,
            RagGenerationConfig::default().with_max_tokens(max_tokens),
            None,
        )
        .await?;
    render_rag(&response, palette, out)
}

/// # Errors
///
/// Returns an error if `out` cannot be written.
pub fn render_rag(
    response: &RagResponse,
    palette: Palette,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    writeln!(out, "{}", palette.heading("Answer:"))?;
    writeln!(out, "{}", rule())?;
    writeln!(out, "{}", response.answer().unwrap_or_default())?;
    writeln!(out, "{}", rule())?;
    writeln!(out)?;

    let citations = response.citations();
    if !citations.is_empty() {
        writeln!(out, "Sources ({}):", citations.len())?;
        for (i, citation) in citations.iter().take(SHOWN_CITATIONS).enumerate() {
            let text =
                truncate_chars(citation.text.as_deref().unwrap_or_default(), CITATION_CHARS);
            writeln!(out, "  {}. {}", i + 1, palette.dim(&format!("{text}...")))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2r_mcp_client::ChunkResult;

    fn response(chunks: Vec<ChunkResult>) -> SearchResponse {
        let mut r = SearchResponse::default();
        r.results.chunk_search_results = chunks;
        r
    }

    fn rendered(r: &SearchResponse) -> String {
        let mut out = Vec::new();
        render_search(r, Palette::default(), &mut out).expect("render");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn empty_results() {
        assert_eq!(rendered(&response(Vec::new())), "No results found\n");
    }

    #[test]
    fn long_passages_are_cut_at_300_chars() {
        let text = "x".repeat(350);
        let out = rendered(&response(vec![ChunkResult {
            document_id: Some("0123456789abcdef".into()),
            text: text.clone(),
            score: Some(0.91234),
            ..ChunkResult::default()
        }]));
        assert!(out.starts_with("Found 1 results:\n"));
        assert!(out.contains("Result 1 | Score: 0.912 | Document: 01234567..."));
        assert!(out.contains(&format!("{}\n...\n", "x".repeat(300))));
        assert!(!out.contains(&text));
    }

    #[test]
    fn missing_document_id_shows_placeholder() {
        let out = rendered(&response(vec![ChunkResult {
            text: "short".into(),
            ..ChunkResult::default()
        }]));
        assert!(out.contains("Score: 0.000 | Document: N/A..."));
        assert!(!out.contains("short\n..."));
    }

    #[test]
    fn rag_shows_three_sources() {
        let r: RagResponse = serde_json::from_value(serde_json::json!({
            "results": {
                "generated_answer": "Forty-two.",
                "citations": [
                    {"text": "one"}, {"text": "two"}, {"text": "three"}, {"text": "four"}
                ]
            }
        }))
        .expect("rag response");
        let mut out = Vec::new();
        render_rag(&r, Palette::default(), &mut out).expect("render");
        let out = String::from_utf8(out).expect("utf8");
        assert!(out.contains("Forty-two."));
        assert!(out.contains("Sources (4):"));
        assert!(out.contains("  3. three..."));
        assert!(!out.contains("four"));
    }
}
