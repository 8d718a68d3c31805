//! Test utilities for tally-core
//!
//! A mock Messages API server for client, pipeline and CLI tests. Replies
//! come from a script first; once the script is exhausted the server answers
//! from the prompt itself:
//!
//! - extraction prompts: every statement line shaped like
//!   `YYYY-MM-DD DESCRIPTION AMOUNT` becomes a transaction
//! - categorization prompts: each listed transaction gets a category picked
//!   by keyword

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 200 with a Messages envelope whose text content is this string
    Text(String),
    /// Arbitrary status with a raw body
    Status(u16, String),
    /// 200 with this raw body (for malformed envelopes)
    Raw(String),
    /// The inner reply, sent after a pause
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn status(status: u16) -> Self {
        Self::Status(status, format!("{{\"error\":\"mock status {}\"}}", status))
    }

    pub fn delayed(delay: Duration, reply: MockReply) -> Self {
        Self::Delay(delay, Box::new(reply))
    }
}

/// A request as seen by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub api_key: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    /// Text of the first user message
    pub fn prompt(&self) -> &str {
        self.body["messages"][0]["content"].as_str().unwrap_or("")
    }

    pub fn temperature(&self) -> f64 {
        self.body["temperature"].as_f64().unwrap_or(f64::NAN)
    }
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock Messages API server
pub struct MockAnthropicServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockAnthropicServer {
    /// Start a server that answers every request from the prompt
    pub async fn start() -> Self {
        Self::with_script(Vec::new()).await
    }

    /// Start a server that plays `script` in order before falling back to
    /// prompt-driven replies
    pub async fn with_script(script: Vec<MockReply>) -> Self {
        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/messages", post(handle_messages))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockAnthropicServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_messages(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    let request = RecordedRequest {
        api_key: headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body,
    };

    let mut reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| MockReply::Text(reply_for_prompt(request.prompt())));
    state.requests.lock().unwrap().push(request);

    while let MockReply::Delay(delay, inner) = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }

    match reply {
        MockReply::Text(text) => (StatusCode::OK, envelope(&text)),
        MockReply::Raw(body) => (StatusCode::OK, body),
        MockReply::Status(code, body) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        ),
        MockReply::Delay(..) => unreachable!("delays are unwrapped above"),
    }
}

/// Messages API envelope around a text reply
fn envelope(text: &str) -> String {
    json!({
        "id": "msg_mock",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "usage": { "input_tokens": 10, "output_tokens": 5 }
    })
    .to_string()
}

/// Reply derived from the prompt when no script entry is left
fn reply_for_prompt(prompt: &str) -> String {
    if let Some(statement) = statement_text(prompt) {
        extraction_mock(statement)
    } else if prompt.contains("[ref:") {
        categorization_mock(prompt)
    } else {
        "[]".to_string()
    }
}

/// The statement section of an extraction prompt
fn statement_text(prompt: &str) -> Option<&str> {
    let start = prompt.find("Statement text:\n")? + "Statement text:\n".len();
    let rest = &prompt[start..];
    let end = rest.find("\n\nExtract all transactions").unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Lines shaped `YYYY-MM-DD DESCRIPTION AMOUNT` become transactions
fn extraction_mock(statement: &str) -> String {
    let records: Vec<Value> = statement
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (date, rest) = line.split_once(' ')?;
            chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            let (description, amount) = rest.trim().rsplit_once(' ')?;
            let amount: f64 = amount.parse().ok()?;
            Some(json!({
                "date": date,
                "description": description.trim(),
                "amount": amount,
                "type": if amount >= 0.0 { "credit" } else { "debit" },
            }))
        })
        .collect();
    Value::Array(records).to_string()
}

/// Category by keyword for each `N. [ref:XXXX] ...` line
fn categorization_mock(prompt: &str) -> String {
    let records: Vec<Value> = prompt
        .lines()
        .filter_map(|line| {
            let (index, rest) = line.split_once(". [ref:")?;
            let index: i64 = index.trim().parse().ok()?;
            let (reference, rest) = rest.split_once(']')?;
            let (category, subcategory) = classify_mock(&rest.to_uppercase());
            Some(json!({
                "index": index,
                "ref": reference,
                "category": category,
                "subcategory": subcategory,
                "confidence": 0.9,
            }))
        })
        .collect();
    Value::Array(records).to_string()
}

fn classify_mock(line: &str) -> (&'static str, &'static str) {
    if line.contains("SALARY") || line.contains("PAYROLL") {
        ("Income", "Salary")
    } else if line.contains("RESTAURANT") || line.contains("CAFE") {
        ("Food & Dining", "Restaurants")
    } else if line.contains("MARKET") || line.contains("GROCER") {
        ("Food & Dining", "Groceries")
    } else if line.contains("UBER") || line.contains("TAXI") {
        ("Transportation", "Ride Sharing")
    } else if line.contains("NETFLIX") || line.contains("SPOTIFY") {
        ("Entertainment", "Streaming")
    } else {
        ("Other", "Miscellaneous")
    }
}
