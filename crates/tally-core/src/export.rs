//! Report emission
//!
//! Writes two files into the output directory:
//! - `transactions_YYYYMMDD.csv`: one row per transaction
//! - `summary_YYYYMMDD.txt`: date range, spending by category, income/expenses/net

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::summary::Summary;

/// CSV column headers, in order
pub const CSV_HEADER: [&str; 8] = [
    "Date",
    "Description",
    "Amount",
    "Type",
    "Category",
    "Subcategory",
    "Confidence",
    "Source",
];

/// Paths of the files written by [`ReportWriter::write`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub transactions_csv: PathBuf,
    pub summary_txt: PathBuf,
}

/// Writes the transaction listing and summary reports
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    /// Timestamp used in file names and the summary header
    generated_at: NaiveDateTime,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            generated_at: Local::now().naive_local(),
        }
    }

    /// Fix the report timestamp (for reproducible output)
    pub fn with_timestamp(mut self, generated_at: NaiveDateTime) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write both reports, creating the output directory if needed
    pub fn write(&self, transactions: &[Transaction], summary: &Summary) -> Result<ReportPaths> {
        if transactions.is_empty() {
            return Err(Error::InvalidData("No transactions to report".into()));
        }

        fs::create_dir_all(&self.output_dir)?;
        let stamp = self.generated_at.format("%Y%m%d");

        let transactions_csv = self.output_dir.join(format!("transactions_{}.csv", stamp));
        let file = fs::File::create(&transactions_csv)?;
        write_transactions_csv(file, transactions)?;

        let summary_txt = self.output_dir.join(format!("summary_{}.txt", stamp));
        let mut file = fs::File::create(&summary_txt)?;
        file.write_all(render_summary(summary, self.generated_at).as_bytes())?;

        info!(dir = %self.output_dir.display(), "Reports written");
        Ok(ReportPaths {
            transactions_csv,
            summary_txt,
        })
    }
}

/// Write the transaction listing as CSV
pub fn write_transactions_csv<W: Write>(writer: W, transactions: &[Transaction]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;

    for tx in transactions {
        csv_writer.write_record([
            tx.date.format("%Y-%m-%d").to_string(),
            tx.description.clone(),
            format!("{:.2}", tx.amount),
            tx.transaction_type.to_string(),
            tx.category.clone(),
            tx.subcategory.clone(),
            format!("{:.2}", tx.confidence),
            tx.source.clone(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Render the plain-text summary report
pub fn render_summary(summary: &Summary, generated_at: NaiveDateTime) -> String {
    let date_or_na = |d: Option<chrono::NaiveDate>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    };

    let mut out = String::new();
    out.push_str("FINANCIAL ANALYSIS SUMMARY\n");
    out.push_str("=========================\n\n");
    out.push_str(&format!(
        "Analysis Date: {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("Total Transactions: {}\n", summary.transaction_count));
    out.push_str(&format!(
        "Date Range: {} to {}\n\n",
        date_or_na(summary.start_date),
        date_or_na(summary.end_date)
    ));

    out.push_str("SPENDING BY CATEGORY\n");
    out.push_str("===================\n");
    if summary.category_totals.is_empty() {
        out.push_str("(no categorized transactions)\n");
    }
    for (category, amount) in &summary.category_totals {
        out.push_str(&format!("{}: ${:.2}\n", category, amount));
    }

    out.push_str("\nINCOME SUMMARY\n");
    out.push_str("==============\n");
    out.push_str(&format!("Total Income: ${:.2}\n", summary.total_income));
    out.push_str(&format!("Total Expenses: ${:.2}\n", summary.total_expenses));
    out.push_str(&format!("Net: ${:.2}\n", summary.net));
    out
}
