//! Shared command utilities
//!
//! - `load_settings` - Resolve settings from file, environment and flags
//! - `open_client` - Build the completion client for a run
//! - `read_document` - Convert one statement file to text

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tally_core::{AnthropicClient, Document, DocumentReader, Settings};

/// Settings given as command-line flags; these win over file and environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dry_run: bool,
    pub debug_dir: Option<PathBuf>,
    pub only_first_chunk: bool,
    pub max_requests: Option<u32>,
    pub chunk_size: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, settings: &mut Settings) {
        if self.dry_run {
            settings.dry_run = true;
        }
        if let Some(dir) = &self.debug_dir {
            settings.debug_dir = Some(dir.clone());
        }
        if self.only_first_chunk {
            settings.only_first_chunk = true;
        }
        if let Some(max) = self.max_requests {
            settings.max_requests = max;
        }
        if let Some(size) = self.chunk_size.filter(|n| *n > 0) {
            settings.chunk_size = size;
        }
    }
}

/// Load settings (defaults, config file, environment) and apply CLI flags
pub fn load_settings(config: Option<&Path>, overrides: &Overrides) -> Result<Settings> {
    let mut settings = Settings::load(config).context("Failed to load settings")?;
    overrides.apply(&mut settings);
    Ok(settings)
}

/// Create the completion client, failing early when no API key is configured
pub fn open_client(settings: &Settings) -> Result<AnthropicClient> {
    let client = AnthropicClient::from_settings(settings)
        .context("Set CLAUDE_API_KEY (or use --dry-run)")?;
    if client.is_dry_run() {
        println!("🧪 Dry run: no API calls will be made");
    }
    Ok(client)
}

/// Convert one statement file to text
pub fn read_document(settings: &Settings, file: &Path) -> Result<(Document, String)> {
    let document = Document::from_path(file)?;
    let reader = DocumentReader::new(&settings.pdf_command)?
        .with_pdf_passwords(&settings.pdf_password_args, settings.pdf_passwords.clone());
    let text = reader
        .read(&document)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok((document, text))
}

/// Truncate a string to at most `max` characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
