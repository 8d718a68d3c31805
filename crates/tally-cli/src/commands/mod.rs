//! CLI command implementations
//!
//! Commands are organized by task:
//! - `analyze` - Full run over an input directory, writing reports
//! - `chunks` - Chunking preview for one document
//! - `core` - Shared utilities (settings, client, document reading)
//! - `extract` - Single-document extraction to JSON
//! - `prompts` - Built-in prompt inspection

pub mod analyze;
pub mod chunks;
pub mod core;
pub mod extract;
pub mod prompts;

// Re-export command functions for main.rs
pub use analyze::*;
pub use chunks::*;
pub use self::core::*;
pub use extract::*;
pub use prompts::*;
