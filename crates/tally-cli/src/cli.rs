//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::Overrides;

/// Tally - Turn bank statements into categorized transactions
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Extract and categorize transactions from bank statements", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Do not call the API; every call returns an empty result
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Save every API request and response under this directory
    #[arg(long, global = true)]
    pub debug_dir: Option<PathBuf>,

    /// Only process the first chunk of each document
    #[arg(long, global = true)]
    pub only_first_chunk: bool,

    /// Maximum number of API calls for the run (0 = unlimited)
    #[arg(long, global = true)]
    pub max_requests: Option<u32>,

    /// Maximum chunk size in bytes
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Settings overrides given on the command line
    pub fn overrides(&self) -> Overrides {
        Overrides {
            dry_run: self.dry_run,
            debug_dir: self.debug_dir.clone(),
            only_first_chunk: self.only_first_chunk,
            max_requests: self.max_requests,
            chunk_size: self.chunk_size,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract, categorize and report on every statement in a directory
    Analyze {
        /// Directory containing .pdf and .txt statements
        #[arg(short, long, default_value = "toProcess")]
        input: PathBuf,

        /// Directory for reports and extracted text
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Skip categorization
        #[arg(long)]
        no_categorize: bool,
    },

    /// Extract transactions from one document and print them as JSON
    Extract {
        /// Statement file (.pdf or .txt)
        #[arg(short, long)]
        file: PathBuf,

        /// Source name stamped on each transaction (defaults to the file name)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Show how a document would be chunked, without calling the API
    Chunks {
        /// Statement file (.pdf or .txt)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Inspect the built-in prompts
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List prompts with version and task type
    List,

    /// Render a prompt with sample data
    Show {
        /// Prompt name: extraction or categorization
        name: String,
    },
}
