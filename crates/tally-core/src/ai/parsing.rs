//! JSON recovery for model replies
//!
//! Models are asked for a bare JSON array but regularly wrap it in prose or
//! code fences, or emit a run of objects with no enclosing array. Recovery
//! is tried in order:
//!
//! 1. the first top-level balanced `[...]` outside string literals
//! 2. the same search inside a ```` ```json ```` block, then any fenced block
//! 3. every top-level `{...}` outside fenced blocks, joined into an array and
//!    validated as a list of objects

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Max characters of the raw reply quoted in error messages
const RAW_PREVIEW_CHARS: usize = 200;

/// Recover a JSON array string from a raw model reply
pub fn extract_json_array(raw: &str) -> Result<String> {
    let content = raw.trim();

    if let Some(array) = first_array(content) {
        return Ok(array.to_string());
    }

    for block in fenced_blocks(content) {
        if let Some(array) = first_array(block) {
            return Ok(array.to_string());
        }
    }

    match array_from_objects(content) {
        Ok(Some(array)) => Ok(array),
        Ok(None) => Err(Error::NoJsonFound(preview(content))),
        Err(e) => Err(e),
    }
}

/// Top-level balanced spans delimited by `open`/`close`, skipping string literals
struct BalancedSpans<'a> {
    text: &'a str,
    open: u8,
    close: u8,
    pos: usize,
    in_string: bool,
    escaped: bool,
    depth: usize,
    start: Option<usize>,
}

impl<'a> BalancedSpans<'a> {
    fn new(text: &'a str, open: u8, close: u8) -> Self {
        Self {
            text,
            open,
            close,
            pos: 0,
            in_string: false,
            escaped: false,
            depth: 0,
            start: None,
        }
    }
}

impl<'a> Iterator for BalancedSpans<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        // Delimiters are ASCII, so scanning bytes never splits a UTF-8 char
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() {
            let i = self.pos;
            let ch = bytes[i];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == b'\\' {
                    self.escaped = true;
                } else if ch == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            if ch == b'"' {
                self.in_string = true;
            } else if ch == self.open {
                if self.depth == 0 {
                    self.start = Some(i);
                }
                self.depth += 1;
            } else if ch == self.close && self.depth > 0 {
                self.depth -= 1;
                if self.depth == 0 {
                    if let Some(start) = self.start.take() {
                        return Some(&self.text[start..=i]);
                    }
                }
            }
        }
        None
    }
}

fn first_array(text: &str) -> Option<&str> {
    BalancedSpans::new(text, b'[', b']').next()
}

/// Interiors of the first ```` ```json ```` block and the first fenced block
fn fenced_blocks(content: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    for opener in ["```json", "```"] {
        if let Some(start) = content.find(opener) {
            let body = &content[start + opener.len()..];
            if let Some(end) = body.find("```") {
                blocks.push(&body[..end]);
            }
        }
    }
    blocks
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[a-zA-Z]*[\s\S]*?```").expect("valid regex"))
}

/// Synthesize an array from standalone objects
///
/// `Ok(None)` when there are no objects at all.
fn array_from_objects(content: &str) -> Result<Option<String>> {
    let cleaned = if content.contains("```") {
        fence_regex().replace_all(content, "")
    } else {
        content.into()
    };

    let objects: Vec<&str> = BalancedSpans::new(&cleaned, b'{', b'}').collect();
    if objects.is_empty() {
        return Ok(None);
    }

    let array = format!("[{}]", objects.join(","));
    serde_json::from_str::<Vec<serde_json::Map<String, serde_json::Value>>>(&array).map_err(
        |e| {
            Error::Parse(format!(
                "Synthesized array is not a list of objects: {} | Raw: {}",
                e,
                preview(&array)
            ))
        },
    )?;
    Ok(Some(array))
}

/// Shorten text for error messages and logs
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(RAW_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_array() {
        let raw = r#"[{"date":"2025-01-15","amount":-10.5}]"#;
        assert_eq!(extract_json_array(raw).unwrap(), raw);
    }

    #[test]
    fn test_array_with_prose() {
        let raw = "Sure! Here are the transactions:\n[{\"a\":1}, {\"a\":2}]\nLet me know.";
        assert_eq!(extract_json_array(raw).unwrap(), r#"[{"a":1}, {"a":2}]"#);
    }

    #[test]
    fn test_json_code_fence() {
        let raw = "Here you go:\n```json\n[{\"a\":1}]\n```";
        assert_eq!(extract_json_array(raw).unwrap(), r#"[{"a":1}]"#);
    }

    #[test]
    fn test_json_fence_behind_unterminated_quote() {
        // The stray quote swallows the array during the whole-reply scan
        let raw = "Note: \"x\n```json\n[{\"a\":1}]\n```";
        assert!(first_array(raw).is_none());
        assert_eq!(extract_json_array(raw).unwrap(), r#"[{"a":1}]"#);
    }

    #[test]
    fn test_untagged_fence_behind_unterminated_quote() {
        let raw = "Note: \"x\n```\n[2]\n```";
        assert!(first_array(raw).is_none());
        assert_eq!(extract_json_array(raw).unwrap(), "[2]");
    }

    #[test]
    fn test_bare_objects_are_joined() {
        let raw = r#"{"a":1}{"b":2}"#;
        assert_eq!(extract_json_array(raw).unwrap(), r#"[{"a":1},{"b":2}]"#);
    }

    #[test]
    fn test_objects_separated_by_prose() {
        let raw = "First: {\"a\":1}\nSecond: {\"b\":{\"nested\":true}}";
        assert_eq!(
            extract_json_array(raw).unwrap(),
            r#"[{"a":1},{"b":{"nested":true}}]"#
        );
    }

    #[test]
    fn test_no_json() {
        let err = extract_json_array("no json here").unwrap_err();
        assert!(matches!(err, Error::NoJsonFound(_)));
        assert!(err.is_parse_failure());
    }

    #[test]
    fn test_bracket_inside_string_literal() {
        let raw = r#"["contains a ] bracket"]"#;
        assert_eq!(extract_json_array(raw).unwrap(), raw);
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let raw = r#"[{"description":"SHOP \"A]\" LTD"}] trailing ]"#;
        assert_eq!(
            extract_json_array(raw).unwrap(),
            r#"[{"description":"SHOP \"A]\" LTD"}]"#
        );
    }

    #[test]
    fn test_nested_arrays() {
        let raw = "result: [[1,2],[3]] done";
        assert_eq!(extract_json_array(raw).unwrap(), "[[1,2],[3]]");
    }

    #[test]
    fn test_empty_array() {
        assert_eq!(extract_json_array("[]").unwrap(), "[]");
    }

    #[test]
    fn test_unbalanced_array_falls_back_to_objects() {
        let raw = r#"[{"a":1}, {"b":2}"#;
        assert_eq!(extract_json_array(raw).unwrap(), r#"[{"a":1},{"b":2}]"#);
    }

    #[test]
    fn test_objects_inside_fences_are_ignored() {
        let raw = "```\n{\"a\":1}\n```\nand outside {\"b\":2}";
        assert_eq!(extract_json_array(raw).unwrap(), r#"[{"b":2}]"#);
    }

    #[test]
    fn test_invalid_objects_fail_validation() {
        let err = extract_json_array("{not: json}").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let short = preview(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), RAW_PREVIEW_CHARS + 3);
        assert_eq!(preview("tiny"), "tiny");
    }
}
