//! Anthropic Messages API client
//!
//! Sends single-turn prompts to `POST {base_url}/v1/messages` and returns the
//! reply envelope. The client owns all per-run call state:
//!
//! - a call budget (`max_requests`, 0 = unlimited) reserved before any I/O
//! - retry with linear backoff on timeouts, connection failures, 429 and 5xx
//! - an optional debug directory receiving every request and reply verbatim
//! - a dry-run mode that never touches the network and replies `[]`
//! - running token usage totals
//!
//! # Configuration
//!
//! Built from [`Settings`](crate::config::Settings); see that module for the
//! environment variables involved.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CompletionBackend;
use crate::config::Settings;
use crate::error::{Error, Result};

/// Public Anthropic endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Value of the `anthropic-version` header
pub const API_VERSION: &str = "2023-06-01";

/// Messages API request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<Message>,
}

impl MessagesRequest {
    /// Single user-turn request
    pub fn user(
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            temperature,
            messages: vec![Message::user(prompt)],
        }
    }

    /// Text of the first user message
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "user", "assistant"
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: text.into(),
        }
    }
}

/// Messages API response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub usage: Usage,
}

impl MessagesResponse {
    /// Envelope carrying a single text block
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            response_type: "message".into(),
            content: vec![ContentBlock {
                block_type: "text".into(),
                text: text.into(),
            }],
            usage: Usage::default(),
        }
    }

    /// Canned reply used in dry-run mode
    pub fn dry_run() -> Self {
        Self::from_text("[]")
    }

    /// Text of the first text block
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
    }
}

/// Content block (only text blocks are produced for these prompts)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Retry schedule for retryable failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Totals across every call made by one client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Client for the Anthropic Messages API
pub struct AnthropicClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    retry: RetryPolicy,
    dry_run: bool,
    debug_dir: Option<PathBuf>,
    /// 0 = unlimited
    max_requests: u32,
    requests_made: AtomicU32,
    debug_seq: AtomicU64,
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl AnthropicClient {
    /// Create a client for `model` with the given request timeout
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Transport)?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            retry: RetryPolicy::default(),
            dry_run: false,
            debug_dir: None,
            max_requests: 0,
            requests_made: AtomicU32::new(0),
            debug_seq: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        })
    }

    /// Create a client from resolved settings
    ///
    /// A missing API key is only an error outside dry-run mode.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = match settings.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ if settings.dry_run => String::new(),
            _ => {
                return Err(Error::Config(
                    "CLAUDE_API_KEY environment variable is required".into(),
                ))
            }
        };

        let client = Self::new(
            api_key,
            &settings.model,
            settings.max_tokens,
            Duration::from_secs(settings.http_timeout_secs),
        )?
        .with_base_url(&settings.base_url)
        .with_dry_run(settings.dry_run)
        .with_max_requests(settings.max_requests);

        Ok(match &settings.debug_dir {
            Some(dir) => client.with_debug_dir(dir),
            None => client,
        })
    }

    /// Point the client at a different server (tests, proxies)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Save every request and reply under `dir`
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.debug_dir = if dir.as_os_str().is_empty() {
            None
        } else {
            Some(dir)
        };
        self
    }

    /// Cap the number of calls (0 = unlimited)
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Calls that have reserved a budget slot so far
    pub fn requests_made(&self) -> u32 {
        self.requests_made.load(Ordering::SeqCst)
    }

    /// Token usage accumulated from successful replies
    pub fn usage(&self) -> UsageTotals {
        UsageTotals {
            calls: self.calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }

    /// Reserve one call from the budget, failing once it is spent
    fn reserve_call(&self) -> Result<()> {
        let max = self.max_requests;
        if max == 0 {
            self.requests_made.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.requests_made
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |made| {
                (made < max).then_some(made + 1)
            })
            .map(|_| ())
            .map_err(|_| Error::BudgetExceeded(max))
    }

    fn record_usage(&self, usage: Usage) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(usage.output_tokens, Ordering::Relaxed);
    }

    /// Write a debug file; failures are logged and otherwise ignored
    fn save_debug_file(&self, prefix: &str, data: &[u8]) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let seq = self.debug_seq.fetch_add(1, Ordering::Relaxed);
        let name = debug_file_name(prefix, seq);
        if let Err(e) = write_debug_file(dir, &name, data) {
            debug!(error = %e, file = %name, "Failed to write debug file");
        }
    }

    /// One HTTP attempt
    async fn post(&self, body: &[u8]) -> Result<MessagesResponse> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .body(body.to_vec())
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = response.status();
        let text = response.text().await.map_err(Error::Transport)?;

        if status.is_success() {
            self.save_debug_file("response", text.as_bytes());
            return serde_json::from_str(&text).map_err(|e| Error::Decode(e.to_string()));
        }

        self.save_debug_file("response_error", text.as_bytes());
        let body = text.trim().to_string();
        let code = status.as_u16();
        if code == 429 {
            Err(Error::RateLimited { status: code, body })
        } else if status.is_server_error() {
            Err(Error::Server { status: code, body })
        } else {
            Err(Error::Protocol(format!(
                "API request failed with status {}: {}",
                code, body
            )))
        }
    }
}

#[async_trait]
impl CompletionBackend for AnthropicClient {
    async fn complete(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let body = serde_json::to_vec(request)?;

        self.reserve_call()?;
        self.save_debug_file("request", &body);

        if self.dry_run {
            let mock = MessagesResponse::dry_run();
            if let Ok(bytes) = serde_json::to_vec(&mock) {
                self.save_debug_file("response_mock", &bytes);
            }
            self.record_usage(mock.usage);
            return Ok(mock);
        }

        debug!(
            model = %request.model,
            prompt_len = request.prompt().len(),
            "Sending completion request"
        );

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.post(&body).await {
                Ok(response) => {
                    debug!(
                        attempt,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "Received completion response"
                    );
                    self.record_usage(response.usage);
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Completion request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// `{prefix}_{YYYYMMDD_HHMMSS_micro}_{seq}.json`
fn debug_file_name(prefix: &str, seq: u64) -> String {
    format!(
        "{}_{}_{}.json",
        prefix,
        chrono::Local::now().format("%Y%m%d_%H%M%S_%6f"),
        seq
    )
}

fn write_debug_file(dir: &Path, name: &str, data: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(name), data)
}
