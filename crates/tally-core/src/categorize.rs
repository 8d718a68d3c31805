//! Categorization engine
//!
//! Transactions are sent to the model in fixed-size batches. Each prompt
//! line carries the transaction's zero-based position in the batch and a
//! short reference hash; the model answers with `{index, ref, category,
//! subcategory, confidence}` records that are applied back by index.
//!
//! A batch that fails (call error or unparseable reply) leaves its
//! transactions uncategorized and does not affect other batches.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::ai::{complete_text, parsing, CompletionBackend};
use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::prompts::build_categorization_prompt;

/// Transactions per categorization request
pub const BATCH_SIZE: usize = 30;

/// Sampling temperature for categorization requests
pub const CATEGORIZATION_TEMPERATURE: f32 = 0.2;

/// Pause between consecutive batches
pub const BATCH_DELAY: Duration = Duration::from_secs(1);

/// Categorization tuning
#[derive(Debug, Clone)]
pub struct CategorizerConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            batch_delay: BATCH_DELAY,
        }
    }
}

/// One record of a categorization reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategorizationResult {
    /// Zero-based position in the batch as presented in the prompt
    pub index: i64,
    /// Echo of the transaction reference, if the model returned it
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Outcome of a full categorization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorizationStats {
    pub batches: usize,
    pub failed_batches: usize,
    /// Transactions that received a category
    pub applied: usize,
}

/// Assigns categories to transactions in place
pub struct Categorizer<'a> {
    backend: &'a dyn CompletionBackend,
    config: CategorizerConfig,
}

impl<'a> Categorizer<'a> {
    pub fn new(backend: &'a dyn CompletionBackend, config: CategorizerConfig) -> Self {
        Self { backend, config }
    }

    /// Categorize every transaction, batch by batch
    ///
    /// All batches are attempted. Returns the first batch failure if any
    /// batch failed; transactions of successful batches are updated either
    /// way. An exhausted call budget stops the remaining batches.
    pub async fn categorize(&self, transactions: &mut [Transaction]) -> Result<CategorizationStats> {
        let mut stats = CategorizationStats::default();
        if transactions.is_empty() {
            info!("No transactions to categorize");
            return Ok(stats);
        }

        let batch_size = self.config.batch_size.max(1);
        let total_batches = transactions.len().div_ceil(batch_size);
        info!(
            transactions = transactions.len(),
            batches = total_batches,
            "Categorizing transactions"
        );

        let mut first_error = None;
        for (i, batch) in transactions.chunks_mut(batch_size).enumerate() {
            let number = i + 1;
            stats.batches += 1;

            match self.categorize_batch(batch).await {
                Ok(applied) => {
                    debug!(batch = number, applied, size = batch.len(), "Batch categorized");
                    stats.applied += applied;
                }
                Err(e) => {
                    warn!(batch = number, error = %e, "Failed to categorize batch");
                    stats.failed_batches += 1;
                    let out_of_budget = matches!(e, Error::BudgetExceeded(_));
                    first_error.get_or_insert(e);
                    if out_of_budget {
                        break;
                    }
                }
            }

            if number < total_batches && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        info!(
            applied = stats.applied,
            failed_batches = stats.failed_batches,
            "Categorization finished"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn categorize_batch(&self, batch: &mut [Transaction]) -> Result<usize> {
        let prompt = build_categorization_prompt(batch);
        let reply = complete_text(self.backend, prompt, CATEGORIZATION_TEMPERATURE).await?;
        let results = parse_categorization_reply(&reply)?;
        Ok(apply_results(batch, &results))
    }
}

/// Parse a categorization reply
///
/// Records that do not match the expected shape are skipped with a warning.
pub fn parse_categorization_reply(reply: &str) -> Result<Vec<CategorizationResult>> {
    let json = parsing::extract_json_array(reply)?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&json).map_err(|e| {
        Error::Parse(format!(
            "Invalid categorization JSON: {} | Raw: {}",
            e,
            parsing::preview(&json)
        ))
    })?;

    Ok(values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value(value) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(record = i, error = %e, "Skipping categorization record");
                None
            }
        })
        .collect())
}

/// Apply results to a batch by index, returning how many were applied
///
/// Results are ignored when the index is outside the batch, the echoed
/// reference does not match the transaction at that index, or the category
/// is blank.
pub fn apply_results(batch: &mut [Transaction], results: &[CategorizationResult]) -> usize {
    let size = batch.len();
    let mut applied = 0;
    for result in results {
        let Some(tx) = usize::try_from(result.index)
            .ok()
            .and_then(|i| batch.get_mut(i))
        else {
            debug!(index = result.index, size, "Ignoring out-of-range index");
            continue;
        };

        if let Some(reference) = result.reference.as_deref().map(str::trim) {
            if !reference.is_empty() && reference != tx.reference() {
                warn!(
                    index = result.index,
                    expected = %tx.reference(),
                    got = %reference,
                    "Reference mismatch, ignoring result"
                );
                continue;
            }
        }

        let category = result.category.trim();
        if category.is_empty() {
            continue;
        }

        tx.category = category.to_string();
        tx.subcategory = result.subcategory.trim().to_string();
        tx.confidence = clamp_confidence(result.confidence);
        applied += 1;
    }
    applied
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
