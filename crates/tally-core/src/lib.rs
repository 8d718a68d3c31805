//! Tally Core Library
//!
//! Shared functionality for the Tally bank statement analyzer:
//! - Document discovery and conversion to text
//! - Page-aware chunking of statement text
//! - Prompt library for extraction and categorization
//! - Completion client (Anthropic Messages API) with retry and call budget
//! - Extraction engine with recursive repair of unparseable replies
//! - Batch categorization engine
//! - Summary statistics and CSV/text report emission

pub mod ai;
pub mod categorize;
pub mod chunking;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod models;
pub mod prompts;
pub mod sources;
pub mod summary;

/// Test utilities including mock Messages API server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AnthropicClient, CompletionBackend, MessagesRequest, MessagesResponse, RetryPolicy,
    ScriptedBackend, UsageTotals,
};
pub use categorize::{CategorizationResult, CategorizationStats, Categorizer, CategorizerConfig};
pub use chunking::{Chunk, TextChunker};
pub use config::Settings;
pub use error::{Error, Result};
pub use export::{ReportPaths, ReportWriter};
pub use extract::{ChunkFailure, DocumentExtraction, Extractor, ExtractorConfig};
pub use models::{Transaction, TransactionType};
pub use prompts::{PromptId, PromptMetadata};
pub use sources::{discover_documents, Document, DocumentKind, DocumentReader, DocumentSource};
pub use summary::Summary;
