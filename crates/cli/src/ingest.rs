//! Batch upload of files matching a glob pattern.

use crate::output::Palette;
use anyhow::Context as _;
use r2r_mcp_client::{DocumentMetadata, DocumentSource, R2rClient};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_PATTERN: &str = "*.pdf";
pub const INGEST_SOURCE: &str = "batch_ingest";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub uploaded: usize,
    pub total: usize,
}

/// Entries of `dir` matching `pattern`, sorted.
///
/// # Errors
///
/// Returns an error if `dir` is missing or not a directory, or `pattern` is not a valid glob.
pub fn find_files(dir: &Path, pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    anyhow::ensure!(dir.exists(), "Directory not found: {}", dir.display());
    anyhow::ensure!(dir.is_dir(), "Not a directory: {}", dir.display());

    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full = format!("{escaped}/{pattern}");
    let mut files: Vec<PathBuf> = glob::glob(&full)
        .with_context(|| format!("invalid pattern '{pattern}'"))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .collect();
    files.sort();
    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Print what would be uploaded without contacting R2R.
///
/// # Errors
///
/// Returns an error if `out` cannot be written.
pub fn dry_run(files: &[PathBuf], out: &mut impl Write) -> anyhow::Result<()> {
    writeln!(out, "Dry run: Found {} files", files.len())?;
    for file in files {
        writeln!(out, "  - {}", display_name(file))?;
    }
    Ok(())
}

/// Upload each file with `{filename, source}` metadata, optionally linking it to `collection_id`.
///
/// A failed file is reported and skipped; the rest are still uploaded.
///
/// # Errors
///
/// Returns an error only if `out` cannot be written.
pub async fn upload_all(
    client: &R2rClient,
    files: &[PathBuf],
    collection_id: Option<&str>,
    palette: Palette,
    out: &mut impl Write,
) -> anyhow::Result<IngestSummary> {
    let total = files.len();
    let mut uploaded = 0;
    for (i, path) in files.iter().enumerate() {
        let name = display_name(path);
        write!(out, "[{}/{total}] Uploading {name}... ", i + 1)?;
        out.flush()?;
        match upload_one(client, path, &name, collection_id).await {
            Ok(document_id) => {
                uploaded += 1;
                writeln!(out, "{}", palette.ok(&format!("ok {document_id}")))?;
            }
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "upload failed");
                writeln!(out, "{}", palette.error(&format!("Error: {e}")))?;
            }
        }
    }
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        palette.ok(&format!("Successfully uploaded {uploaded}/{total} documents"))
    )?;
    Ok(IngestSummary { uploaded, total })
}

async fn upload_one(
    client: &R2rClient,
    path: &Path,
    name: &str,
    collection_id: Option<&str>,
) -> anyhow::Result<String> {
    let metadata = DocumentMetadata::default()
        .with_field("filename", name)
        .with_field("source", INGEST_SOURCE);
    let created = client
        .create_document(DocumentSource::File(path.to_path_buf()), Some(metadata), &[])
        .await?;
    let document_id = created.results.id.unwrap_or_default();
    if let Some(collection_id) = collection_id
        && !document_id.is_empty()
    {
        client
            .add_document_to_collection(collection_id, &document_id)
            .await
            .with_context(|| format!("uploaded as {document_id} but not added to collection"))?;
    }
    Ok(document_id)
}

/// Find matching files and either list them or upload them.
///
/// # Errors
///
/// Returns an error for a missing directory, a bad pattern, or an unwritable `out`.
pub async fn ingest(
    client: &R2rClient,
    dir: &Path,
    pattern: &str,
    collection_id: Option<&str>,
    palette: Palette,
    out: &mut impl Write,
) -> anyhow::Result<IngestSummary> {
    let files = find_files(dir, pattern)?;
    if files.is_empty() {
        writeln!(
            out,
            "{}",
            palette.error(&format!(
                "No files matching '{pattern}' found in {}",
                dir.display()
            ))
        )?;
        return Ok(IngestSummary::default());
    }
    writeln!(out, "Found {} files matching '{pattern}'", files.len())?;
    writeln!(out)?;
    upload_all(client, &files, collection_id, palette, out).await
}
