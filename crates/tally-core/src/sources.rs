//! Document discovery and document-to-text conversion
//!
//! Plain `.txt` statements are read as-is. PDFs go through an external
//! converter command (by default `pdftotext -layout {input} -`) whose stdout
//! is the text. Converters separate pages with form feeds; those are
//! rewritten into `--- Page N ---` lines so the chunker can split on them.
//! Password-protected PDFs are retried with each configured password.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::chunking::PAGE_MARKER_PREFIX;
use crate::error::{Error, Result};

/// Default PDF converter; `{input}` is replaced by the file path
pub const DEFAULT_PDF_COMMAND: &str = "pdftotext -layout {input} -";

/// Default password arguments for encrypted PDFs
pub const DEFAULT_PDF_PASSWORD_ARGS: &str = "-upw {password}";

const INPUT_PLACEHOLDER: &str = "{input}";
const PASSWORD_PLACEHOLDER: &str = "{password}";
const FORM_FEED: char = '\u{c}';

/// Something that turns a document into UTF-8 text
pub trait DocumentSource {
    fn to_text(&self, path: &Path) -> Result<String>;
}

/// Reads UTF-8 text files
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextSource;

impl DocumentSource for PlainTextSource {
    fn to_text(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }
}

/// Runs an external converter and captures its stdout
///
/// Encrypted PDFs are retried once per configured password, with the
/// password arguments placed ahead of the template arguments.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    password_args: Vec<String>,
    passwords: Vec<String>,
}

impl CommandSource {
    /// Parse a whitespace-separated command template
    ///
    /// Each `{input}` is replaced by the document path. Without a
    /// placeholder the path is appended as the last argument.
    pub fn from_template(template: &str) -> Result<Self> {
        let mut parts = template.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("Document converter command is empty".into()))?;
        let mut args: Vec<String> = parts.collect();
        if !args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            args.push(INPUT_PLACEHOLDER.to_string());
        }
        Ok(Self {
            program,
            args,
            password_args: Vec::new(),
            passwords: Vec::new(),
        })
    }

    /// Passwords to try when the plain conversion fails
    ///
    /// `password_args` is a template like `-upw {password}`; without a
    /// placeholder the password is appended to it.
    pub fn with_passwords(mut self, password_args: &str, passwords: Vec<String>) -> Self {
        let mut template: Vec<String> = password_args
            .split_whitespace()
            .map(String::from)
            .collect();
        if !template.iter().any(|a| a.contains(PASSWORD_PLACEHOLDER)) {
            template.push(PASSWORD_PLACEHOLDER.to_string());
        }
        self.password_args = template;
        self.passwords = passwords.into_iter().filter(|p| !p.is_empty()).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for converting `path`
    pub fn args_for(&self, path: &Path) -> Vec<String> {
        let input = path.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, &input))
            .collect()
    }

    /// Argument lists in the order they are tried: unlocked first, then
    /// one per password
    pub fn attempts_for(&self, path: &Path) -> Vec<Vec<String>> {
        let plain = self.args_for(path);
        let mut attempts = vec![plain.clone()];
        for password in &self.passwords {
            let mut args: Vec<String> = self
                .password_args
                .iter()
                .map(|a| a.replace(PASSWORD_PLACEHOLDER, password))
                .collect();
            args.extend(plain.iter().cloned());
            attempts.push(args);
        }
        attempts
    }

    fn run(&self, path: &Path, args: &[String]) -> Result<String> {
        let output = Command::new(&self.program).args(args).output().map_err(|e| {
            Error::InvalidData(format!("Failed to run '{}': {}", self.program, e))
        })?;

        if !output.status.success() {
            return Err(Error::InvalidData(format!(
                "'{}' failed on {} ({}): {}",
                self.program,
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|_| {
            Error::InvalidData(format!(
                "Converter output for {} is not valid UTF-8",
                path.display()
            ))
        })
    }
}

impl DocumentSource for CommandSource {
    fn to_text(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(Error::InvalidData(format!(
                "Document does not exist: {}",
                path.display()
            )));
        }

        // Later attempts carry passwords, so only the first is logged verbatim
        let attempts = self.attempts_for(path);
        debug!(program = %self.program, args = ?attempts[0], "Running document converter");

        let mut last_error = None;
        for (attempt, args) in attempts.iter().enumerate() {
            match self.run(path, args) {
                Ok(text) => {
                    if attempt > 0 {
                        debug!(
                            document = %path.display(),
                            password = attempt,
                            "Converted with a configured password"
                        );
                    }
                    return Ok(insert_page_markers(&text));
                }
                Err(e) => {
                    if attempt + 1 < attempts.len() {
                        debug!(attempt, error = %e, "Converter failed, trying next password");
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::InvalidData(format!("No converter attempts for {}", path.display()))
        }))
    }
}

/// Rewrite form-feed page breaks into `--- Page N ---` marker lines
///
/// Text without form feeds is returned unchanged.
pub fn insert_page_markers(text: &str) -> String {
    if !text.contains(FORM_FEED) {
        return text.to_string();
    }

    let mut pages: Vec<&str> = text.split(FORM_FEED).collect();
    // A trailing form feed ends the last page rather than starting a new one
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }

    pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            format!(
                "{}{} ---\n{}\n",
                PAGE_MARKER_PREFIX,
                i + 1,
                page.trim_end_matches('\n')
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Supported document kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Kind from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

/// A statement file found in the input directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// File name, used as the transaction source
    pub name: String,
    pub kind: DocumentKind,
}

impl Document {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let kind = DocumentKind::from_path(&path).ok_or_else(|| {
            Error::InvalidData(format!(
                "Unsupported document type (expected .pdf or .txt): {}",
                path.display()
            ))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { path, name, kind })
    }

    /// File name without extension
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// List `.pdf` and `.txt` files in `dir`, sorted by name
pub fn discover_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(Error::InvalidData(format!(
            "Input directory does not exist: {}",
            dir.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && DocumentKind::from_path(&path).is_some() {
            documents.push(Document::from_path(path)?);
        }
    }

    if documents.is_empty() {
        return Err(Error::InvalidData(format!(
            "No .pdf or .txt documents found in {}",
            dir.display()
        )));
    }

    documents.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(documents)
}

/// Converts any supported document to text
#[derive(Debug, Clone)]
pub struct DocumentReader {
    pdf: CommandSource,
    text: PlainTextSource,
}

impl DocumentReader {
    pub fn new(pdf_command: &str) -> Result<Self> {
        Ok(Self {
            pdf: CommandSource::from_template(pdf_command)?,
            text: PlainTextSource,
        })
    }

    /// Passwords tried on PDFs the converter cannot open as-is
    pub fn with_pdf_passwords(mut self, password_args: &str, passwords: Vec<String>) -> Self {
        self.pdf = self.pdf.with_passwords(password_args, passwords);
        self
    }

    pub fn read(&self, document: &Document) -> Result<String> {
        match document.kind {
            DocumentKind::Pdf => self.pdf.to_text(&document.path),
            DocumentKind::Text => self.text.to_text(&document.path),
        }
    }
}
