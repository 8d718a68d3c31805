//! Tally CLI - Bank statement extraction and categorization
//!
//! Usage:
//!   tally analyze --input toProcess --output output   Full run with reports
//!   tally extract --file statement.pdf                 Print one document's transactions
//!   tally chunks --file statement.pdf                  Preview chunking
//!   tally prompts show extraction                      Render a prompt

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in a local .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let overrides = cli.overrides();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            no_categorize,
        } => {
            let settings = commands::load_settings(cli.config.as_deref(), &overrides)?;
            commands::cmd_analyze(&settings, &input, &output, no_categorize).await
        }
        Commands::Extract { file, source } => {
            let settings = commands::load_settings(cli.config.as_deref(), &overrides)?;
            commands::cmd_extract(&settings, &file, source.as_deref()).await
        }
        Commands::Chunks { file } => {
            let settings = commands::load_settings(cli.config.as_deref(), &overrides)?;
            commands::cmd_chunks(&settings, &file)
        }
        Commands::Prompts { action } => match action {
            PromptsAction::List => commands::cmd_prompts_list(),
            PromptsAction::Show { name } => commands::cmd_prompts_show(&name),
        },
    }
}
