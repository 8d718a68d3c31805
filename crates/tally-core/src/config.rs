//! Run settings
//!
//! Settings are resolved in layers, later layers winning:
//!
//! 1. built-in defaults
//! 2. optional TOML file (`--config PATH`, or `config.toml` under the
//!    platform data directory, e.g. `~/.local/share/tally/config.toml`)
//! 3. environment variables (see [`Settings::apply_env`])
//! 4. command-line flags (applied by the CLI)
//!
//! # Config file
//!
//! ```toml
//! [claude]
//! model = "claude-sonnet-4-20250514"
//! max_tokens = 2048
//! timeout_secs = 120
//!
//! [extraction]
//! chunk_size = 12000
//! only_first_chunk = false
//!
//! [run]
//! dry_run = false
//! debug_dir = "debug"
//! max_requests = 0
//!
//! [documents]
//! pdf_command = "pdftotext -layout {input} -"
//! pdf_password_args = "-upw {password}"
//! pdf_passwords = ["1234", "19900101"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ai::anthropic::DEFAULT_BASE_URL;
use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::sources::{DEFAULT_PDF_COMMAND, DEFAULT_PDF_PASSWORD_ARGS};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Chunk sizes at or below this are rejected from the environment
pub const MIN_ENV_CHUNK_SIZE: usize = 1000;

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Required unless `dry_run`
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub http_timeout_secs: u64,
    pub base_url: String,
    pub chunk_size: usize,
    pub dry_run: bool,
    pub debug_dir: Option<PathBuf>,
    pub only_first_chunk: bool,
    /// Max completion calls per run (0 = unlimited)
    pub max_requests: u32,
    /// Converter for PDF documents, `{input}` is replaced by the file path
    pub pdf_command: String,
    /// Extra converter arguments for encrypted PDFs, `{password}` is replaced
    pub pdf_password_args: String,
    /// Tried in order when a PDF cannot be converted as-is
    pub pdf_passwords: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: DEFAULT_BASE_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            dry_run: false,
            debug_dir: None,
            only_first_chunk: false,
            max_requests: 0,
            pdf_command: DEFAULT_PDF_COMMAND.to_string(),
            pdf_password_args: DEFAULT_PDF_PASSWORD_ARGS.to_string(),
            pdf_passwords: Vec::new(),
        }
    }
}

impl Settings {
    /// Defaults, then the config file, then the process environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(content) = read_config_file(config_path)? {
            settings.apply_toml(&content)?;
        }
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Overlay values from TOML content
    pub fn apply_toml(&mut self, content: &str) -> Result<()> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

        if let Some(claude) = raw.claude {
            if let Some(key) = claude.api_key {
                self.api_key = Some(key);
            }
            if let Some(model) = claude.model {
                self.model = model;
            }
            if let Some(max_tokens) = claude.max_tokens.filter(|n| *n > 0) {
                self.max_tokens = max_tokens;
            }
            if let Some(timeout) = claude.timeout_secs.filter(|n| *n > 0) {
                self.http_timeout_secs = timeout;
            }
            if let Some(base_url) = claude.base_url {
                self.base_url = base_url;
            }
        }

        if let Some(extraction) = raw.extraction {
            if let Some(size) = extraction.chunk_size.filter(|n| *n > 0) {
                self.chunk_size = size;
            }
            if let Some(only_first) = extraction.only_first_chunk {
                self.only_first_chunk = only_first;
            }
        }

        if let Some(run) = raw.run {
            if let Some(dry_run) = run.dry_run {
                self.dry_run = dry_run;
            }
            if let Some(dir) = run.debug_dir {
                self.debug_dir = non_empty_path(&dir);
            }
            if let Some(max) = run.max_requests {
                self.max_requests = max;
            }
        }

        if let Some(documents) = raw.documents {
            if let Some(command) = documents.pdf_command {
                self.pdf_command = command;
            }
            if let Some(args) = documents.pdf_password_args {
                self.pdf_password_args = args;
            }
            if let Some(passwords) = documents.pdf_passwords {
                self.pdf_passwords = passwords;
            }
        }

        Ok(())
    }

    /// Overlay values from environment variables
    ///
    /// | Variable | Setting |
    /// |---|---|
    /// | `CLAUDE_API_KEY` (or `ANTHROPIC_API_KEY`) | API key |
    /// | `CLAUDE_MODEL` | model |
    /// | `CLAUDE_MAX_TOKENS` | max output tokens (> 0) |
    /// | `CLAUDE_HTTP_TIMEOUT_SECONDS` | HTTP timeout (> 0) |
    /// | `CLAUDE_API_BASE_URL` | API base URL |
    /// | `EXTRACTION_CHUNK_SIZE` | chunk size (> 1000) |
    /// | `TALLY_DRY_RUN` | dry run |
    /// | `TALLY_DEBUG_DIR` | debug directory |
    /// | `TALLY_ONLY_FIRST_CHUNK` | only first chunk |
    /// | `TALLY_MAX_REQUESTS` | call budget |
    /// | `TALLY_PDF_COMMAND` | PDF converter command |
    /// | `TALLY_PDF_PASSWORDS` | comma-separated PDF passwords |
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get("CLAUDE_API_KEY").or_else(|| get("ANTHROPIC_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = get("CLAUDE_MODEL") {
            self.model = model;
        }
        if let Some(n) = get("CLAUDE_MAX_TOKENS").and_then(|v| v.parse::<u32>().ok()) {
            if n > 0 {
                self.max_tokens = n;
            }
        }
        if let Some(n) = get("CLAUDE_HTTP_TIMEOUT_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            if n > 0 {
                self.http_timeout_secs = n;
            }
        }
        if let Some(url) = get("CLAUDE_API_BASE_URL") {
            self.base_url = url;
        }
        if let Some(n) = get("EXTRACTION_CHUNK_SIZE").and_then(|v| v.parse::<usize>().ok()) {
            if n > MIN_ENV_CHUNK_SIZE {
                self.chunk_size = n;
            }
        }
        if let Some(flag) = get("TALLY_DRY_RUN").and_then(|v| parse_flag(&v)) {
            self.dry_run = flag;
        }
        if let Some(dir) = get("TALLY_DEBUG_DIR") {
            self.debug_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = get("TALLY_ONLY_FIRST_CHUNK").and_then(|v| parse_flag(&v)) {
            self.only_first_chunk = flag;
        }
        if let Some(n) = get("TALLY_MAX_REQUESTS").and_then(|v| v.parse::<u32>().ok()) {
            self.max_requests = n;
        }
        if let Some(command) = get("TALLY_PDF_COMMAND") {
            self.pdf_command = command;
        }
        if let Some(list) = get("TALLY_PDF_PASSWORDS") {
            self.pdf_passwords = list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Whether a usable API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config.toml"))
}

/// Read the explicit config file, or the default one if it exists
///
/// An explicit path that does not exist is an error.
fn read_config_file(explicit: Option<&Path>) -> Result<Option<String>> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(None),
        },
    };

    fs::read_to_string(&path)
        .map(Some)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    claude: Option<RawClaude>,
    extraction: Option<RawExtraction>,
    run: Option<RawRun>,
    documents: Option<RawDocuments>,
}

#[derive(Debug, Deserialize)]
struct RawClaude {
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    chunk_size: Option<usize>,
    only_first_chunk: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawRun {
    dry_run: Option<bool>,
    debug_dir: Option<String>,
    max_requests: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawDocuments {
    pdf_command: Option<String>,
    pdf_password_args: Option<String>,
    pdf_passwords: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.model, "claude-sonnet-4-20250514");
        assert_eq!(settings.max_tokens, 2048);
        assert_eq!(settings.http_timeout_secs, 120);
        assert_eq!(settings.chunk_size, 12_000);
        assert_eq!(settings.max_requests, 0);
        assert!(!settings.dry_run);
        assert!(!settings.has_api_key());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[
            ("CLAUDE_API_KEY", "sk-test"),
            ("CLAUDE_MODEL", "claude-other"),
            ("CLAUDE_MAX_TOKENS", "4096"),
            ("CLAUDE_HTTP_TIMEOUT_SECONDS", "30"),
            ("EXTRACTION_CHUNK_SIZE", "8000"),
            ("TALLY_DRY_RUN", "true"),
            ("TALLY_DEBUG_DIR", "debug"),
            ("TALLY_ONLY_FIRST_CHUNK", "1"),
            ("TALLY_MAX_REQUESTS", "5"),
        ]));

        assert_eq!(settings.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.model, "claude-other");
        assert_eq!(settings.max_tokens, 4096);
        assert_eq!(settings.http_timeout_secs, 30);
        assert_eq!(settings.chunk_size, 8000);
        assert!(settings.dry_run);
        assert_eq!(settings.debug_dir, Some(PathBuf::from("debug")));
        assert!(settings.only_first_chunk);
        assert_eq!(settings.max_requests, 5);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[
            ("CLAUDE_MAX_TOKENS", "-1"),
            ("CLAUDE_HTTP_TIMEOUT_SECONDS", "0"),
            ("EXTRACTION_CHUNK_SIZE", "500"),
            ("TALLY_DRY_RUN", "maybe"),
            ("TALLY_MAX_REQUESTS", "lots"),
            ("CLAUDE_MODEL", "   "),
        ]));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_anthropic_key_fallback() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[("ANTHROPIC_API_KEY", "sk-fallback")]));
        assert_eq!(settings.api_key.as_deref(), Some("sk-fallback"));

        settings.apply_env(env(&[
            ("ANTHROPIC_API_KEY", "sk-fallback"),
            ("CLAUDE_API_KEY", "sk-primary"),
        ]));
        assert_eq!(settings.api_key.as_deref(), Some("sk-primary"));
    }

    #[test]
    fn test_toml_layer() {
        let mut settings = Settings::default();
        settings
            .apply_toml(
                r#"
[claude]
model = "claude-from-file"
max_tokens = 1024

[extraction]
chunk_size = 9000

[run]
max_requests = 10
debug_dir = ""

[documents]
pdf_command = "mutool draw -F txt {input}"
pdf_passwords = ["1234", "5678"]
"#,
            )
            .unwrap();

        assert_eq!(settings.model, "claude-from-file");
        assert_eq!(settings.max_tokens, 1024);
        assert_eq!(settings.chunk_size, 9000);
        assert_eq!(settings.max_requests, 10);
        assert_eq!(settings.debug_dir, None);
        assert_eq!(settings.pdf_command, "mutool draw -F txt {input}");
        assert_eq!(settings.pdf_passwords, vec!["1234", "5678"]);
        assert_eq!(settings.pdf_password_args, "-upw {password}");
    }

    #[test]
    fn test_pdf_passwords_from_env() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[("TALLY_PDF_PASSWORDS", " 1234, ,19900101 ")]));
        assert_eq!(settings.pdf_passwords, vec!["1234", "19900101"]);
    }

    #[test]
    fn test_env_wins_over_file() {
        let mut settings = Settings::default();
        settings.apply_toml("[claude]\nmodel = \"file\"\n").unwrap();
        settings.apply_env(env(&[("CLAUDE_MODEL", "env")]));
        assert_eq!(settings.model, "env");
    }

    #[test]
    fn test_invalid_toml() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.apply_toml("[claude\nmodel ="),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[run]\ndry_run = true\n").unwrap();

        let content = read_config_file(Some(&path)).unwrap().unwrap();
        assert!(content.contains("dry_run"));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            read_config_file(Some(&missing)),
            Err(Error::Config(_))
        ));
    }
}
