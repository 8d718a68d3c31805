//! Extraction engine: statement text to transactions
//!
//! Each document is chunked, and every chunk goes through
//! prompt, call, parse. When a reply cannot be parsed as JSON and the chunk
//! is large, the chunk is bisected and each half is retried independently,
//! down to a fixed depth. Whatever parses is kept.
//!
//! Failures never cross chunk boundaries: a failed chunk is recorded in
//! [`DocumentExtraction::failed_chunks`] and the next chunk is processed.
//! The one exception is an exhausted call budget, which ends the document
//! since every further call would fail the same way.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::{complete_text, parsing, CompletionBackend};
use crate::chunking::{floor_char_boundary, TextChunker, DEFAULT_CHUNK_SIZE};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{Transaction, TransactionType};
use crate::prompts::build_extraction_prompt;

/// Sampling temperature for extraction requests
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// Pieces at or below this size are not bisected further
pub const MIN_SPLIT_SIZE: usize = 6_000;

/// Maximum bisection depth below a chunk
pub const MAX_SPLIT_DEPTH: u32 = 3;

/// Pause between consecutive chunks of one document
pub const CHUNK_DELAY: Duration = Duration::from_millis(200);

/// Extraction tuning
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub chunk_size: usize,
    /// Process only the first chunk of each document
    pub only_first_chunk: bool,
    pub chunk_delay: Duration,
    pub min_split_size: usize,
    pub max_split_depth: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            only_first_chunk: false,
            chunk_delay: CHUNK_DELAY,
            min_split_size: MIN_SPLIT_SIZE,
            max_split_depth: MAX_SPLIT_DEPTH,
        }
    }
}

impl ExtractorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            only_first_chunk: settings.only_first_chunk,
            ..Self::default()
        }
    }
}

/// A chunk that yielded nothing usable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    /// 1-based chunk number
    pub chunk: usize,
    pub error: String,
}

/// Result of extracting one document
#[derive(Debug, Clone, Serialize)]
pub struct DocumentExtraction {
    pub source: String,
    /// All chunks' transactions, in chunk order
    pub transactions: Vec<Transaction>,
    pub chunk_count: usize,
    /// Chunks not processed because of only-first-chunk mode or an exhausted budget
    pub skipped_chunks: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl DocumentExtraction {
    /// Whether every processed chunk succeeded
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }
}

/// What one chunk produced
struct ChunkOutcome {
    transactions: Vec<Transaction>,
    /// Set when no piece of the chunk could be extracted, or the budget ran out
    error: Option<Error>,
}

/// Turns document text into transactions
pub struct Extractor<'a> {
    backend: &'a dyn CompletionBackend,
    config: ExtractorConfig,
}

impl<'a> Extractor<'a> {
    pub fn new(backend: &'a dyn CompletionBackend, config: ExtractorConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract every transaction from `text`, stamping each with `source`
    pub async fn extract(&self, text: &str, source: &str) -> DocumentExtraction {
        let chunker = TextChunker::new(self.config.chunk_size);
        let chunks = chunker.split(text);
        let total = chunks.len();
        let to_process = if self.config.only_first_chunk {
            total.min(1)
        } else {
            total
        };

        if total > 1 {
            info!(source, chunks = total, "Large statement, splitting into chunks");
        }
        if to_process < total {
            info!(
                source,
                skipped = total - to_process,
                "Only processing the first chunk"
            );
        }

        let mut result = DocumentExtraction {
            source: source.to_string(),
            transactions: Vec::new(),
            chunk_count: total,
            skipped_chunks: total - to_process,
            failed_chunks: Vec::new(),
        };

        for (i, chunk) in chunks.iter().take(to_process).enumerate() {
            let number = i + 1;
            if chunk.text.trim().is_empty() {
                debug!(source, chunk = number, "Skipping blank chunk");
                continue;
            }
            if total > 1 {
                info!(source, chunk = number, total, "Processing chunk");
            }

            let outcome = self.extract_chunk(chunk.text, source, number, total).await;
            result.transactions.extend(outcome.transactions);

            if let Some(error) = outcome.error {
                warn!(source, chunk = number, error = %error, "Chunk extraction failed");
                let out_of_budget = matches!(error, Error::BudgetExceeded(_));
                result.failed_chunks.push(ChunkFailure {
                    chunk: number,
                    error: error.to_string(),
                });
                if out_of_budget {
                    result.skipped_chunks += to_process - number;
                    break;
                }
            }

            if number < to_process && !self.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
        }

        info!(
            source,
            transactions = result.transactions.len(),
            failed_chunks = result.failed_chunks.len(),
            "Extracted transactions"
        );
        result
    }

    /// Extract one chunk, bisecting pieces whose reply does not parse
    ///
    /// Pieces are walked depth-first, left half before right, so results
    /// keep document order.
    async fn extract_chunk(
        &self,
        chunk: &str,
        source: &str,
        index: usize,
        total: usize,
    ) -> ChunkOutcome {
        let mut pending = vec![(chunk, 0u32)];
        let mut transactions = Vec::new();
        let mut parsed_any = false;
        let mut last_error = None;

        while let Some((piece, depth)) = pending.pop() {
            match self.extract_piece(piece, source, index, total).await {
                Ok(found) => {
                    parsed_any = true;
                    transactions.extend(found);
                }
                Err(e)
                    if e.is_parse_failure()
                        && depth < self.config.max_split_depth
                        && piece.len() > self.config.min_split_size =>
                {
                    warn!(
                        source,
                        chunk = index,
                        len = piece.len(),
                        depth,
                        error = %e,
                        "Unparseable reply, splitting and retrying"
                    );
                    let mid = floor_char_boundary(piece, piece.len() / 2);
                    let (left, right) = piece.split_at(mid);
                    pending.push((right, depth + 1));
                    pending.push((left, depth + 1));
                }
                Err(e @ Error::BudgetExceeded(_)) => {
                    return ChunkOutcome {
                        transactions,
                        error: Some(e),
                    };
                }
                Err(e) => {
                    debug!(source, chunk = index, len = piece.len(), error = %e, "Piece failed");
                    last_error = Some(e);
                }
            }
        }

        let error = if parsed_any { None } else { last_error };
        ChunkOutcome {
            transactions,
            error,
        }
    }

    async fn extract_piece(
        &self,
        text: &str,
        source: &str,
        index: usize,
        total: usize,
    ) -> Result<Vec<Transaction>> {
        let prompt = build_extraction_prompt(text, source, index, total);
        let reply = complete_text(self.backend, prompt, EXTRACTION_TEMPERATURE).await?;
        parse_extraction_reply(&reply, source)
    }
}

/// One array element as the model wrote it
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<serde_json::Value>,
}

/// Parse an extraction reply into transactions
///
/// Fails only when no JSON array can be recovered. Individual records that
/// are malformed are dropped with a warning.
pub fn parse_extraction_reply(reply: &str, source: &str) -> Result<Vec<Transaction>> {
    let json = parsing::extract_json_array(reply)?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&json).map_err(|e| {
        Error::Parse(format!(
            "Invalid JSON array from model: {} | Raw: {}",
            e,
            parsing::preview(&json)
        ))
    })?;

    let mut transactions = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        match record_to_transaction(value, source) {
            Ok(tx) => transactions.push(tx),
            Err(reason) => warn!(source, record = i, reason = %reason, "Skipping transaction"),
        }
    }
    Ok(transactions)
}

fn record_to_transaction(
    value: serde_json::Value,
    source: &str,
) -> std::result::Result<Transaction, String> {
    let record: RawRecord =
        serde_json::from_value(value).map_err(|e| format!("malformed record: {}", e))?;

    let date_text = record.date.unwrap_or_default();
    let date = parse_date(&date_text)
        .ok_or_else(|| format!("could not parse date '{}'", date_text))?;

    let amount = match &record.amount {
        Some(value) => {
            parse_amount(value).ok_or_else(|| format!("could not parse amount {}", value))?
        }
        None => return Err("missing amount".into()),
    };

    let transaction_type = record
        .kind
        .as_ref()
        .and_then(|v| v.as_str())
        .map(TransactionType::from_label)
        .unwrap_or_default();

    Ok(Transaction::new(
        date,
        record.description.unwrap_or_default(),
        amount,
        transaction_type,
        source,
    ))
}

/// `YYYY-MM-DD`, optionally followed by a time component
fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    let (day, rest) = (text.get(..10)?, text.get(10..)?);
    if rest.starts_with('T') || rest.starts_with(' ') {
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    } else {
        None
    }
}

/// A JSON number, or a string holding one
fn parse_amount(value: &serde_json::Value) -> Option<f64> {
    let amount = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}
