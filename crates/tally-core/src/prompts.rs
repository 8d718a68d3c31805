//! Prompt builder for extraction and categorization requests
//!
//! Prompt templates live in `prompts/*.md` at the repository root and are
//! compiled into the binary. Each file carries YAML frontmatter (id,
//! version, task type) followed by the template body.
//!
//! Templates use `{{var}}` placeholders and `{{#if var}}...{{/if}}` blocks
//! that are kept only when `var` is set and non-empty. Rendering is a single
//! pass over the template, so statement text that happens to contain
//! `{{...}}` is never expanded.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::Transaction;

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const EXTRACT_TRANSACTIONS: &str =
        include_str!("../../../prompts/extract_transactions.md");
    pub const CATEGORIZE_TRANSACTIONS: &str =
        include_str!("../../../prompts/categorize_transactions.md");
}

/// Category used when the model is unsure
pub const FALLBACK_CATEGORY: &str = "Other";

/// Top-level categories with representative subcategories
pub const CATEGORIES: &[(&str, &[&str])] = &[
    ("Food & Dining", &["Restaurants", "Groceries", "Fast Food", "Coffee"]),
    ("Transportation", &["Gas", "Public Transit", "Ride Sharing", "Parking"]),
    ("Shopping", &["Clothing", "Electronics", "Home & Garden", "Online Shopping"]),
    ("Entertainment", &["Movies", "Games", "Streaming Services", "Events"]),
    ("Health & Fitness", &["Medical", "Gym", "Pharmacy", "Wellness"]),
    ("Bills & Utilities", &["Electricity", "Water", "Internet", "Phone"]),
    ("Income", &["Salary", "Freelance", "Investment", "Refunds"]),
    ("Banking", &["ATM", "Fees", "Transfers"]),
    ("Travel", &["Flights", "Hotels", "Car Rental", "Tourism"]),
    ("Education", &["Tuition", "Books", "Courses"]),
    ("Insurance", &["Health", "Auto", "Home", "Life"]),
    (FALLBACK_CATEGORY, &["Uncategorized"]),
];

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    ExtractTransactions,
    CategorizeTransactions,
}

impl PromptId {
    /// Get the string identifier for this prompt
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractTransactions => "extract_transactions",
            Self::CategorizeTransactions => "categorize_transactions",
        }
    }

    /// Get all known prompt IDs
    pub fn all() -> &'static [PromptId] {
        &[Self::ExtractTransactions, Self::CategorizeTransactions]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::ExtractTransactions => defaults::EXTRACT_TRANSACTIONS,
            Self::CategorizeTransactions => defaults::CATEGORIZE_TRANSACTIONS,
        }
    }

    /// Template body without frontmatter
    pub fn template(&self) -> &'static str {
        split_frontmatter(self.default_content()).1
    }

    /// Parsed frontmatter
    pub fn metadata(&self) -> Result<PromptMetadata> {
        let (front, _) = split_frontmatter(self.default_content());
        let front = front.ok_or_else(|| {
            Error::InvalidData(format!("Prompt {} has no frontmatter", self.as_str()))
        })?;
        serde_yaml::from_str(front).map_err(|e| {
            Error::InvalidData(format!("Invalid frontmatter in {}: {}", self.as_str(), e))
        })
    }
}

impl std::str::FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extract_transactions" | "extraction" | "extract" => Ok(Self::ExtractTransactions),
            "categorize_transactions" | "categorization" | "categorize" => {
                Ok(Self::CategorizeTransactions)
            }
            _ => Err(format!("Unknown prompt: {}", s)),
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    pub task_type: String,
}

/// Build the extraction prompt for one chunk
///
/// `chunk_index` is 1-based. When the document has more than one chunk the
/// prompt is prefixed with a note restricting the model to this chunk.
pub fn build_extraction_prompt(
    text: &str,
    source: &str,
    chunk_index: usize,
    total_chunks: usize,
) -> String {
    let chunk_note = if total_chunks > 1 {
        format!("This is chunk {} of {}.", chunk_index, total_chunks)
    } else {
        String::new()
    };

    let mut vars = HashMap::new();
    vars.insert("chunk_note", chunk_note.as_str());
    vars.insert("source", source);
    vars.insert("text", text);

    render(PromptId::ExtractTransactions.template(), &vars)
}

/// Build the categorization prompt for one batch
///
/// Each transaction is listed with its zero-based position in the batch,
/// which the model must echo back as `index`.
pub fn build_categorization_prompt(transactions: &[Transaction]) -> String {
    let categories = taxonomy_listing();
    let listing = transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| {
            format!(
                "{}. [ref:{}] Date: {} | Description: {} | Amount: {:.2} | Type: {}",
                i,
                tx.reference(),
                tx.date.format("%Y-%m-%d"),
                tx.description,
                tx.amount,
                tx.transaction_type
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut vars = HashMap::new();
    vars.insert("fallback", FALLBACK_CATEGORY);
    vars.insert("categories", categories.as_str());
    vars.insert("transactions", listing.as_str());

    render(PromptId::CategorizeTransactions.template(), &vars)
}

/// "- Category (Sub, Sub, ...)" lines for the taxonomy
fn taxonomy_listing() -> String {
    CATEGORIES
        .iter()
        .map(|(category, subs)| format!("- {} ({})", category, subs.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split `---` delimited YAML frontmatter from the body
fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content.strip_prefix("---\n") else {
        return (None, content);
    };
    match rest.find("\n---\n") {
        Some(end) => (Some(&rest[..end]), &rest[end + 5..]),
        None => (None, content),
    }
}

/// Render a template in a single pass
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut skipping = false;

    while let Some(open) = rest.find("{{") {
        let (before, after) = rest.split_at(open);
        if !skipping {
            out.push_str(before);
        }

        let Some(close) = after.find("}}") else {
            break;
        };
        let tag = after[2..close].trim();
        rest = &after[close + 2..];

        if let Some(key) = tag.strip_prefix("#if ") {
            skipping = vars.get(key.trim()).map_or(true, |v| v.is_empty());
        } else if tag == "/if" {
            skipping = false;
        } else if !skipping {
            match vars.get(tag) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str("{{");
                    out.push_str(tag);
                    out.push_str("}}");
                }
            }
        }
    }

    if !skipping {
        out.push_str(rest);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use chrono::NaiveDate;

    fn tx(description: &str, amount: f64) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            description,
            amount,
            if amount < 0.0 {
                TransactionType::Debit
            } else {
                TransactionType::Credit
            },
            "statement.pdf",
        )
    }

    #[test]
    fn test_embedded_metadata() {
        for id in PromptId::all() {
            let meta = id.metadata().unwrap();
            assert_eq!(meta.id, id.as_str());
            assert!(meta.version >= 1);
        }
    }

    #[test]
    fn test_template_has_no_frontmatter() {
        assert!(!PromptId::ExtractTransactions.template().starts_with("---"));
        assert!(!PromptId::CategorizeTransactions
            .template()
            .contains("task_type:"));
    }

    #[test]
    fn test_single_chunk_extraction_prompt() {
        let prompt = build_extraction_prompt("01/15 SHOP 10,00", "jan.pdf", 1, 1);
        assert!(prompt.starts_with("You are a financial transaction extractor."));
        assert!(!prompt.contains("chunk 1 of 1"));
        assert!(prompt.contains("Statement source: jan.pdf"));
        assert!(prompt.contains("Statement text:\n01/15 SHOP 10,00\n"));
        assert!(prompt.contains("comma as decimal separator"));
        assert!(prompt.contains("only include the NET transaction"));
    }

    #[test]
    fn test_multi_chunk_extraction_prompt() {
        let prompt = build_extraction_prompt("text", "jan.pdf", 2, 3);
        assert!(prompt.starts_with(
            "You are extracting transactions from a bank statement. This is chunk 2 of 3. \
             Only extract transactions that appear in this chunk."
        ));
    }

    #[test]
    fn test_extraction_prompt_is_deterministic() {
        let a = build_extraction_prompt("same text", "s", 1, 2);
        let b = build_extraction_prompt("same text", "s", 1, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_statement_text_is_embedded_verbatim() {
        let text = "weird {{source}} and {{#if text}} inside statement";
        let prompt = build_extraction_prompt(text, "real.pdf", 1, 1);
        assert!(prompt.contains(text));
    }

    #[test]
    fn test_categorization_prompt_lists_batch_in_order() {
        let batch = vec![tx("COFFEE SHOP", -4.5), tx("SALARY", 3000.0)];
        let prompt = build_categorization_prompt(&batch);

        let first = format!(
            "0. [ref:{}] Date: 2025-01-15 | Description: COFFEE SHOP | Amount: -4.50 | Type: debit",
            batch[0].reference()
        );
        let second = format!(
            "1. [ref:{}] Date: 2025-01-15 | Description: SALARY | Amount: 3000.00 | Type: credit",
            batch[1].reference()
        );
        assert!(prompt.contains(&first));
        assert!(prompt.contains(&second));
        assert!(prompt.find(&first).unwrap() < prompt.find(&second).unwrap());
    }

    #[test]
    fn test_categorization_prompt_has_taxonomy_and_fallback() {
        let prompt = build_categorization_prompt(&[tx("X", -1.0)]);
        assert!(prompt.contains("- Food & Dining (Restaurants, Groceries, Fast Food, Coffee)"));
        assert!(prompt.contains("- Other (Uncategorized)"));
        assert!(prompt.contains("use 'Other'"));
        assert!(prompt.contains("\"index\": 0"));
    }

    #[test]
    fn test_render_conditionals() {
        let mut vars = HashMap::new();
        vars.insert("name", "x");
        vars.insert("empty", "");
        assert_eq!(render("a{{#if name}}[{{name}}]{{/if}}b", &vars), "a[x]b");
        assert_eq!(render("a{{#if empty}}[gone]{{/if}}b", &vars), "ab");
        assert_eq!(render("a{{#if missing}}[gone]{{/if}}b", &vars), "ab");
        assert_eq!(render("keep {{unknown}}", &vars), "keep {{unknown}}");
    }

    #[test]
    fn test_prompt_id_from_str() {
        assert_eq!(
            "extraction".parse::<PromptId>().unwrap(),
            PromptId::ExtractTransactions
        );
        assert_eq!(
            "categorize_transactions".parse::<PromptId>().unwrap(),
            PromptId::CategorizeTransactions
        );
        assert!("bogus".parse::<PromptId>().is_err());
    }
}
