//! Completion service abstraction
//!
//! The extraction and categorization engines talk to the model through the
//! [`CompletionBackend`] trait. Two implementations exist:
//!
//! - [`AnthropicClient`]: the Messages API over HTTP (retry, budget, dry run,
//!   debug sink)
//! - [`ScriptedBackend`]: replies computed by a closure, for tests
//!
//! # Usage
//!
//! ```rust,ignore
//! let settings = Settings::load(None)?;
//! let client = AnthropicClient::from_settings(&settings)?;
//!
//! let request = MessagesRequest::user(client.model(), client.max_tokens(), 0.1, prompt);
//! let reply = client.complete(&request).await?;
//! let json = parsing::extract_json_array(reply.text().unwrap_or_default())?;
//! ```

pub mod anthropic;
mod mock;
pub mod parsing;

pub use anthropic::{
    AnthropicClient, ContentBlock, Message, MessagesRequest, MessagesResponse, RetryPolicy, Usage,
    UsageTotals,
};
pub use mock::ScriptedBackend;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Trait defining a completion service
///
/// Implementations must be Send + Sync so engines can hold them across
/// await points.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send one request and return the reply envelope
    async fn complete(&self, request: &MessagesRequest) -> Result<MessagesResponse>;

    /// Model identifier placed in requests
    fn model(&self) -> &str;

    /// Output token cap placed in requests
    fn max_tokens(&self) -> u32;
}

/// Send a single-prompt request and return the reply text
pub async fn complete_text(
    backend: &dyn CompletionBackend,
    prompt: String,
    temperature: f32,
) -> Result<String> {
    let request = MessagesRequest::user(backend.model(), backend.max_tokens(), temperature, prompt);
    let response = backend.complete(&request).await?;
    response
        .text()
        .map(str::to_string)
        .ok_or_else(|| Error::Decode("No text content in API response".into()))
}
