//! Chunking preview

use std::path::Path;

use anyhow::Result;
use tally_core::{Settings, TextChunker};

use super::{read_document, truncate};

pub fn cmd_chunks(settings: &Settings, file: &Path) -> Result<()> {
    let (document, text) = read_document(settings, file)?;
    let chunker = TextChunker::new(settings.chunk_size);
    let chunks = chunker.split(&text);

    println!(
        "{}: {} bytes, {} chunk(s) of at most {} bytes",
        document.name,
        text.len(),
        chunks.len(),
        chunker.max_chunk_size()
    );
    if settings.only_first_chunk && chunks.len() > 1 {
        println!("Only the first chunk would be processed (--only-first-chunk)");
    }
    println!();

    println!("{:>5}  {:>8}  {:>7}  {}", "CHUNK", "OFFSET", "BYTES", "FIRST LINE");
    println!("{}", "-".repeat(70));

    for (i, chunk) in chunks.iter().enumerate() {
        let first_line = chunk
            .text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");
        println!(
            "{:>5}  {:>8}  {:>7}  {}",
            i + 1,
            chunk.offset,
            chunk.len(),
            truncate(first_line, 45)
        );
    }

    Ok(())
}
