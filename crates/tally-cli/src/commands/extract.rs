//! Single-document extraction

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{Extractor, ExtractorConfig, Settings};

use super::{open_client, read_document};

/// Extract one document and print the result as JSON on stdout
pub async fn cmd_extract(settings: &Settings, file: &Path, source: Option<&str>) -> Result<()> {
    let (document, text) = read_document(settings, file)?;
    let client = open_client(settings)?;

    let extractor = Extractor::new(&client, ExtractorConfig::from_settings(settings));
    let source = source.unwrap_or(&document.name);
    let extraction = extractor.extract(&text, source).await;

    let json =
        serde_json::to_string_pretty(&extraction).context("Failed to serialize extraction")?;
    println!("{}", json);

    if !extraction.is_complete() {
        eprintln!(
            "⚠️  {} of {} chunk(s) failed",
            extraction.failed_chunks.len(),
            extraction.chunk_count
        );
    }
    Ok(())
}
