//! Plain-text renderings of R2R responses for tool output and the CLI.

use crate::types::{RagResponse, SearchResponse};
use std::fmt::Write as _;

const SNIPPET_CHARS: usize = 200;
const CITATION_CHARS: usize = 100;

/// Render search hits as numbered blocks with score, a text snippet and the document id.
///
/// At most `max_results` hits are rendered when given.
#[must_use]
pub fn format_search_results(response: &SearchResponse, max_results: Option<usize>) -> String {
    let chunks = response.chunks();
    if chunks.is_empty() {
        return "No results found".to_string();
    }

    let take = max_results.unwrap_or(chunks.len());
    chunks
        .iter()
        .take(take)
        .enumerate()
        .map(|(i, chunk)| {
            let mut block = String::new();
            let _ = write!(
                block,
                "\nResult {}:\n  Score: {:.3}\n  Text: {}...\n  Document: {}\n",
                i + 1,
                chunk.score.unwrap_or(0.0),
                truncate_chars(&chunk.text, SNIPPET_CHARS),
                chunk.document_id.as_deref().unwrap_or("N/A"),
            );
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// First 100 characters of each citation's text.
#[must_use]
pub fn extract_citations(response: &RagResponse) -> Vec<String> {
    response
        .citations()
        .iter()
        .map(|c| truncate_chars(c.text.as_deref().unwrap_or_default(), CITATION_CHARS).to_string())
        .collect()
}

/// Longest prefix of `text` holding at most `max` characters.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
