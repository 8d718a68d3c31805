//! Integration tests for tally-core
//!
//! These tests exercise the full discover → extract → categorize → report
//! workflow, once over HTTP against the mock Messages API server and
//! otherwise with a scripted completion backend.

use std::fs;
use std::time::Duration;

use serde_json::{json, Value};
use tally_core::test_utils::MockAnthropicServer;
use tally_core::{
    discover_documents, AnthropicClient, Categorizer, CategorizerConfig, DocumentReader, Error,
    Extractor, ExtractorConfig, ReportWriter, RetryPolicy, ScriptedBackend, Summary,
    TransactionType,
};

/// Statement with one salary credit and three card debits
fn january_statement() -> &'static str {
    "--- Page 1 ---\n\
     BANCO EJEMPLO  Statement January 2025\n\
     2025-01-03 RESTAURANT ABC -45.50\n\
     2025-01-05 SALARY ACME CORP 3000.00\n\
     \n\
     --- Page 2 ---\n\
     2025-01-12 UBER TRIP -12.30\n\
     2025-01-20 SUPERMARKET XYZ -88.20\n\
     Closing balance 2854.00\n"
}

/// Statement text section of an extraction prompt
fn statement_section(prompt: &str) -> &str {
    let start = prompt.find("Statement text:\n").map(|i| i + 16).unwrap_or(0);
    let rest = &prompt[start..];
    let end = rest
        .find("\n\nExtract all transactions")
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Behaves like a well-mannered model for both prompt kinds
fn model_like_backend() -> ScriptedBackend {
    ScriptedBackend::new(|request| {
        let prompt = request.prompt();
        if prompt.contains("Statement text:") {
            let records: Vec<Value> = statement_section(prompt)
                .lines()
                .filter_map(|line| {
                    let (date, rest) = line.trim().split_once(' ')?;
                    if date.len() != 10 || !date.starts_with("20") {
                        return None;
                    }
                    let (desc, amount) = rest.rsplit_once(' ')?;
                    let amount: f64 = amount.parse().ok()?;
                    let kind = if amount < 0.0 { "debit" } else { "credit" };
                    Some(json!({"date": date, "description": desc, "amount": amount, "type": kind}))
                })
                .collect();
            // Wrap in prose and fences the way models sometimes do
            Ok(format!(
                "Here are the transactions:\n```json\n{}\n```",
                Value::Array(records)
            ))
        } else {
            let records: Vec<Value> = prompt
                .lines()
                .filter_map(|line| {
                    let (index, rest) = line.split_once(". [ref:")?;
                    let index: i64 = index.parse().ok()?;
                    let (reference, rest) = rest.split_once(']')?;
                    let category = if rest.contains("SALARY") {
                        "Income"
                    } else if rest.contains("UBER") {
                        "Transportation"
                    } else {
                        "Food & Dining"
                    };
                    Some(json!({
                        "index": index,
                        "ref": reference,
                        "category": category,
                        "subcategory": "General",
                        "confidence": 0.9
                    }))
                })
                .collect();
            Ok(Value::Array(records).to_string())
        }
    })
}

fn extractor_config(chunk_size: usize) -> ExtractorConfig {
    ExtractorConfig {
        chunk_size,
        chunk_delay: Duration::ZERO,
        ..ExtractorConfig::default()
    }
}

fn categorizer_config() -> CategorizerConfig {
    CategorizerConfig {
        batch_size: 2,
        batch_delay: Duration::ZERO,
    }
}

// =============================================================================
// Full Pipeline
// =============================================================================

#[tokio::test]
async fn test_full_pipeline_writes_reports() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(input.path().join("jan.txt"), january_statement()).unwrap();
    fs::write(input.path().join("notes.md"), "ignored").unwrap();

    let documents = discover_documents(input.path()).unwrap();
    assert_eq!(documents.len(), 1);

    let reader = DocumentReader::new("pdftotext -layout {input} -").unwrap();
    let backend = model_like_backend();
    let extractor = Extractor::new(&backend, extractor_config(12_000));

    let mut transactions = Vec::new();
    for doc in &documents {
        let text = reader.read(doc).unwrap();
        let extraction = extractor.extract(&text, &doc.name).await;
        assert!(extraction.is_complete());
        assert_eq!(extraction.chunk_count, 1);
        transactions.extend(extraction.transactions);
    }
    assert_eq!(transactions.len(), 4);
    assert!(transactions.iter().all(|t| t.source == "jan.txt"));
    assert_eq!(transactions[1].transaction_type, TransactionType::Credit);

    let categorizer = Categorizer::new(&backend, categorizer_config());
    let stats = categorizer.categorize(&mut transactions).await.unwrap();
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.applied, 4);
    assert_eq!(transactions[1].category, "Income");
    assert_eq!(transactions[2].category, "Transportation");

    let summary = Summary::from_transactions(&transactions);
    assert_eq!(summary.transaction_count, 4);
    assert!((summary.total_income - 3000.0).abs() < 1e-9);
    assert!((summary.total_expenses - 146.0).abs() < 1e-9);
    assert!((summary.net - 2854.0).abs() < 1e-9);
    assert!((summary.category_totals["Food & Dining"] + 133.7).abs() < 1e-9);

    let paths = ReportWriter::new(output.path().join("reports"))
        .write(&transactions, &summary)
        .unwrap();
    let csv = fs::read_to_string(&paths.transactions_csv).unwrap();
    assert_eq!(csv.lines().count(), 5);
    assert!(csv.contains("2025-01-12,UBER TRIP,-12.30,debit,Transportation,General,0.90,jan.txt"));
    let summary_txt = fs::read_to_string(&paths.summary_txt).unwrap();
    assert!(summary_txt.contains("Date Range: 2025-01-03 to 2025-01-20"));
    assert!(summary_txt.contains("Net: $2854.00"));

    // 1 extraction call + 2 categorization batches
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_full_pipeline_over_http() {
    let server = MockAnthropicServer::start().await;
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(input.path().join("jan.txt"), january_statement()).unwrap();

    let client = AnthropicClient::new("test-key", "test-model", 2048, Duration::from_secs(5))
        .unwrap()
        .with_base_url(&server.url())
        .with_retry_policy(RetryPolicy::immediate(2));
    let reader = DocumentReader::new("pdftotext -layout {input} -").unwrap();
    let extractor = Extractor::new(&client, extractor_config(12_000));

    let mut transactions = Vec::new();
    for doc in discover_documents(input.path()).unwrap() {
        let text = reader.read(&doc).unwrap();
        let extraction = extractor.extract(&text, &doc.name).await;
        assert!(extraction.is_complete());
        transactions.extend(extraction.transactions);
    }
    assert_eq!(transactions.len(), 4);

    let categorizer = Categorizer::new(&client, categorizer_config());
    let stats = categorizer.categorize(&mut transactions).await.unwrap();
    assert_eq!(stats.applied, 4);
    assert_eq!(transactions[1].category, "Income");
    assert_eq!(transactions[3].subcategory, "Groceries");

    let summary = Summary::from_transactions(&transactions);
    assert!((summary.net - 2854.0).abs() < 1e-9);
    assert!((summary.category_totals["Food & Dining"] + 133.7).abs() < 1e-9);

    let paths = ReportWriter::new(output.path())
        .write(&transactions, &summary)
        .unwrap();
    let csv = fs::read_to_string(&paths.transactions_csv).unwrap();
    assert!(csv.contains("2025-01-20,SUPERMARKET XYZ,-88.20,debit,Food & Dining,Groceries,0.90,jan.txt"));

    // 1 extraction call + 2 categorization batches, one budget slot each
    assert_eq!(server.request_count(), 3);
    assert_eq!(client.requests_made(), 3);
    assert_eq!(client.usage().input_tokens, 30);
    assert!(server
        .requests()
        .iter()
        .all(|r| r.api_key.as_deref() == Some("test-key")));
}

#[tokio::test]
async fn test_chunked_document_keeps_order_and_notes_chunks() {
    let backend = model_like_backend();
    // Page 1 is 122 bytes and page 2 is 101, so a 130-byte limit gives one page per chunk
    let extractor = Extractor::new(&backend, extractor_config(130));

    let extraction = extractor.extract(january_statement(), "jan.txt").await;
    assert_eq!(extraction.chunk_count, 2);
    assert!(extraction.is_complete());

    let descriptions: Vec<_> = extraction
        .transactions
        .iter()
        .map(|t| t.description.as_str())
        .collect();
    assert_eq!(
        descriptions,
        vec!["RESTAURANT ABC", "SALARY ACME CORP", "UBER TRIP", "SUPERMARKET XYZ"]
    );

    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("This is chunk 1 of 2."));
    assert!(prompts[1].contains("This is chunk 2 of 2."));
    assert!(statement_section(&prompts[1]).starts_with("--- Page 2 ---"));
}

#[tokio::test]
async fn test_only_first_chunk() {
    let backend = model_like_backend();
    let extractor = Extractor::new(
        &backend,
        ExtractorConfig {
            only_first_chunk: true,
            ..extractor_config(130)
        },
    );

    let extraction = extractor.extract(january_statement(), "jan.txt").await;
    assert_eq!(extraction.chunk_count, 2);
    assert_eq!(extraction.skipped_chunks, 1);
    assert_eq!(extraction.transactions.len(), 2);
    assert_eq!(backend.calls(), 1);
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test]
async fn test_failing_chunk_does_not_lose_others() {
    let backend = ScriptedBackend::new(|request| {
        let prompt = request.prompt();
        if prompt.contains("chunk 1 of 2") {
            Ok("I could not find any transactions, sorry.".to_string())
        } else {
            Ok(r#"[{"date":"2025-01-12","description":"UBER TRIP","amount":-12.3,"type":"debit"}]"#
                .to_string())
        }
    });
    let extractor = Extractor::new(&backend, extractor_config(130));

    let extraction = extractor.extract(january_statement(), "jan.txt").await;
    assert_eq!(extraction.transactions.len(), 1);
    assert_eq!(extraction.failed_chunks.len(), 1);
    assert_eq!(extraction.failed_chunks[0].chunk, 1);
    assert!(!extraction.is_complete());
}

#[tokio::test]
async fn test_budget_exhaustion_stops_document() {
    let backend = ScriptedBackend::new(|_| Err(Error::BudgetExceeded(0)));
    let extractor = Extractor::new(&backend, extractor_config(130));

    let extraction = extractor.extract(january_statement(), "jan.txt").await;
    assert!(extraction.transactions.is_empty());
    assert_eq!(extraction.failed_chunks.len(), 1);
    assert_eq!(extraction.skipped_chunks, 1);
    assert_eq!(backend.calls(), 1);
}

#[test]
fn test_report_requires_transactions() {
    let output = tempfile::tempdir().unwrap();
    let result = ReportWriter::new(output.path()).write(&[], &Summary::default());
    assert!(result.is_err());
    assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
}
