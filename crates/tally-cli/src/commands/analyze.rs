//! Full analysis run: statements in, reports out

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{
    discover_documents, Categorizer, CategorizerConfig, DocumentReader, Extractor,
    ExtractorConfig, ReportWriter, Settings, Summary,
};
use tracing::warn;

use super::open_client;

pub async fn cmd_analyze(
    settings: &Settings,
    input: &Path,
    output: &Path,
    skip_categorization: bool,
) -> Result<()> {
    let documents = discover_documents(input)
        .with_context(|| format!("No statements to process in {}", input.display()))?;
    let reader = DocumentReader::new(&settings.pdf_command)?
        .with_pdf_passwords(&settings.pdf_password_args, settings.pdf_passwords.clone());
    let client = open_client(settings)?;

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    println!(
        "📂 Found {} statement(s) in {}",
        documents.len(),
        input.display()
    );

    let extractor = Extractor::new(&client, ExtractorConfig::from_settings(settings));
    let mut transactions = Vec::new();
    let mut failed_documents = 0;

    for document in &documents {
        println!();
        println!("📄 Processing {}...", document.name);

        let text = match reader.read(document) {
            Ok(text) => text,
            Err(e) => {
                warn!(document = %document.name, error = %e, "Failed to read document");
                println!("   ⚠️  Skipped: {}", e);
                failed_documents += 1;
                continue;
            }
        };

        let text_path = output.join(format!("{}_extracted.txt", document.stem()));
        if let Err(e) = fs::write(&text_path, &text) {
            warn!(path = %text_path.display(), error = %e, "Failed to save extracted text");
        }

        let extraction = extractor.extract(&text, &document.name).await;
        println!(
            "   Found {} transactions ({} chunk(s))",
            extraction.transactions.len(),
            extraction.chunk_count
        );
        if extraction.skipped_chunks > 0 {
            println!("   Skipped chunks: {}", extraction.skipped_chunks);
        }
        for failure in &extraction.failed_chunks {
            println!("   ⚠️  Chunk {} failed: {}", failure.chunk, failure.error);
        }
        if !extraction.is_complete() {
            failed_documents += 1;
        }

        transactions.extend(extraction.transactions);
    }

    println!();
    if transactions.is_empty() {
        println!("No transactions found. No reports written.");
        return Ok(());
    }

    println!("✅ Extracted {} transactions", transactions.len());

    if !skip_categorization {
        println!();
        println!("🏷️  Categorizing transactions...");

        let categorizer = Categorizer::new(&client, CategorizerConfig::default());
        match categorizer.categorize(&mut transactions).await {
            Ok(stats) => {
                println!(
                    "   Categorized: {} of {} ({} batch(es))",
                    stats.applied,
                    transactions.len(),
                    stats.batches
                );
            }
            Err(e) => {
                warn!(error = %e, "Categorization incomplete");
                println!("   ⚠️  Categorization incomplete: {}", e);
            }
        }
    }

    let uncategorized = Summary::uncategorized_count(&transactions);
    let summary = Summary::from_transactions(&transactions);
    let paths = ReportWriter::new(output)
        .write(&transactions, &summary)
        .context("Failed to write reports")?;

    println!();
    println!("📊 Summary");
    if let (Some(start), Some(end)) = (summary.start_date, summary.end_date) {
        println!("   Period:   {} to {}", start, end);
    }
    println!("   Income:   ${:.2}", summary.total_income);
    println!("   Expenses: ${:.2}", summary.total_expenses);
    println!("   Net:      ${:.2}", summary.net);
    if uncategorized > 0 && !skip_categorization {
        println!("   Uncategorized: {}", uncategorized);
    }

    let usage = client.usage();
    println!();
    println!(
        "   API calls: {} (tokens in: {}, out: {})",
        usage.calls, usage.input_tokens, usage.output_tokens
    );
    if failed_documents > 0 {
        println!("   ⚠️  {} statement(s) had failures", failed_documents);
    }

    println!();
    println!("📝 Reports written:");
    println!("   {}", paths.transactions_csv.display());
    println!("   {}", paths.summary_txt.display());

    Ok(())
}
