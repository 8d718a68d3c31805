//! Scripted backend for testing
//!
//! Replies are produced by a closure over the request, so engine tests can
//! vary the reply by prompt content without an HTTP server.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::anthropic::{MessagesRequest, MessagesResponse};
use super::CompletionBackend;
use crate::error::Result;

type Responder = dyn Fn(&MessagesRequest) -> Result<String> + Send + Sync;

/// Backend whose replies come from a closure
///
/// Every request is recorded and can be inspected after the run.
#[derive(Clone)]
pub struct ScriptedBackend {
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<MessagesRequest>>>,
}

impl ScriptedBackend {
    /// Reply with whatever `responder` returns for each request
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&MessagesRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always reply with the same text
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Number of requests received
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Prompts of all requests received, in order
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.prompt().to_string()).collect())
            .unwrap_or_default()
    }

    /// All requests received, in order
    pub fn requests(&self) -> Vec<MessagesRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        (self.responder)(request).map(MessagesResponse::from_text)
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn max_tokens(&self) -> u32 {
        2048
    }
}
