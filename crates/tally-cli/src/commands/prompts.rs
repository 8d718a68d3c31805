//! Prompts-related command implementations

use anyhow::Result;
use chrono::NaiveDate;
use tally_core::models::{Transaction, TransactionType};
use tally_core::prompts::{build_categorization_prompt, build_extraction_prompt, PromptId};

const SAMPLE_STATEMENT: &str = "--- Page 1 ---\n\
15/01/2025  RESTAURANTE ABC BOGOTA        -125.000,50\n\
16/01/2025  PAGO NOMINA ACME               3.000.000,00\n";

/// List all built-in prompts
pub fn cmd_prompts_list() -> Result<()> {
    println!("Available Prompts:\n");

    println!("{:<28} {:>7}  {:<22}  {}", "ID", "VERSION", "TASK TYPE", "ALIAS");
    println!("{}", "-".repeat(72));

    for id in PromptId::all() {
        let meta = id.metadata()?;
        println!(
            "{:<28} {:>7}  {:<22}  {}",
            meta.id,
            meta.version,
            meta.task_type,
            alias(*id)
        );
    }

    println!();
    println!("Render one with sample data: tally prompts show <alias>");
    Ok(())
}

/// Render a prompt with sample data
pub fn cmd_prompts_show(name: &str) -> Result<()> {
    let id: PromptId = name.parse().map_err(|e: String| {
        let known: Vec<_> = PromptId::all().iter().map(|id| alias(*id)).collect();
        anyhow::anyhow!("{} (expected one of: {})", e, known.join(", "))
    })?;
    let meta = id.metadata()?;

    println!("Prompt: {}", meta.id);
    println!("Version: {}", meta.version);
    println!("Task Type: {}", meta.task_type);
    println!();
    println!("--- Rendered with sample data ---");
    println!("{}", render_sample(id));

    Ok(())
}

fn alias(id: PromptId) -> &'static str {
    match id {
        PromptId::ExtractTransactions => "extraction",
        PromptId::CategorizeTransactions => "categorization",
    }
}

/// The prompt as it would be sent for a small sample statement
pub fn render_sample(id: PromptId) -> String {
    match id {
        PromptId::ExtractTransactions => {
            build_extraction_prompt(SAMPLE_STATEMENT, "sample.pdf", 1, 1)
        }
        PromptId::CategorizeTransactions => {
            let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap_or_default();
            let sample = vec![
                Transaction::new(
                    date,
                    "RESTAURANTE ABC BOGOTA",
                    -125000.50,
                    TransactionType::Debit,
                    "sample.pdf",
                ),
                Transaction::new(
                    date.succ_opt().unwrap_or(date),
                    "PAGO NOMINA ACME",
                    3000000.00,
                    TransactionType::Credit,
                    "sample.pdf",
                ),
            ];
            build_categorization_prompt(&sample)
        }
    }
}
