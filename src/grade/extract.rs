#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Recovering a JSON object from free-form model output.
//!
//! Models are asked for bare JSON but regularly wrap it in a fenced code
//! block or surround it with prose. Each [`ExtractionStrategy`] looks for the
//! object in one of those shapes; [`extract`] applies them in order, loosest
//! last, and returns the first object that parses.

use serde_json::Value;

use crate::error::StructuredOutputError;

/// Characters of raw output kept in an extraction error.
const PREVIEW_CHARS: usize = 500;

/// A single way of locating structured data inside raw text.
pub trait ExtractionStrategy {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the parsed value if this strategy finds one.
    fn extract(&self, text: &str) -> Option<Value>;
}

/// Parses the whole (trimmed) response.
#[derive(Debug, Default, Clone, Copy)]
pub struct WholeText;

impl ExtractionStrategy for WholeText {
    fn name(&self) -> &'static str {
        "whole text"
    }

    fn extract(&self, text: &str) -> Option<Value> {
        serde_json::from_str(text.trim()).ok().filter(Value::is_object)
    }
}

/// Parses the first fenced code block whose body is valid JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct FencedBlock;

impl ExtractionStrategy for FencedBlock {
    fn name(&self) -> &'static str {
        "fenced block"
    }

    fn extract(&self, text: &str) -> Option<Value> {
        fenced_bodies(text).find_map(|body| {
            serde_json::from_str(body.trim()).ok().filter(Value::is_object)
        })
    }
}

/// Iterates the bodies of ```` ``` ```` fenced blocks, skipping an optional
/// info string (`json`, `JSON`, ...) on the opening line.
fn fenced_bodies(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let open = rest.find("```")?;
        let after_open = &rest[open + 3..];
        let close = after_open.find("```")?;
        let block = &after_open[..close];
        rest = &after_open[close + 3..];

        let body = match block.find('\n') {
            Some(nl) if is_info_string(&block[..nl]) => &block[nl + 1..],
            _ => block
                .trim_start()
                .strip_prefix("json")
                .unwrap_or(block),
        };
        Some(body)
    })
}

/// Whether the first line of a fenced block is a language tag rather than
/// content.
fn is_info_string(line: &str) -> bool {
    let line = line.trim();
    line.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parses the first top-level balanced `{ ... }` span that is valid JSON.
/// Objects nested inside a span that fails to parse are never candidates.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedObject;

impl ExtractionStrategy for BalancedObject {
    fn name(&self) -> &'static str {
        "balanced object"
    }

    fn extract(&self, text: &str) -> Option<Value> {
        let mut offset = 0;
        while let Some(found) = text[offset..].find('{') {
            let start = offset + found;
            let end = balanced_end(&text[start..])?;
            match serde_json::from_str::<Value>(&text[start..start + end]) {
                Ok(value) if value.is_object() => return Some(value),
                _ => offset = start + end,
            }
        }
        None
    }
}

/// Given text starting at `{`, returns the byte length of the balanced
/// object, ignoring braces inside string literals.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strategies in the order they are tried.
pub fn default_strategies() -> [&'static dyn ExtractionStrategy; 3] {
    [&WholeText, &FencedBlock, &BalancedObject]
}

/// Applies the default strategies to `raw` and returns the first parsed
/// object.
pub fn extract(raw: &str) -> Result<Value, StructuredOutputError> {
    extract_with(raw, &default_strategies())
}

/// Applies `strategies` in order and returns the first parsed value.
pub fn extract_with(
    raw: &str,
    strategies: &[&dyn ExtractionStrategy],
) -> Result<Value, StructuredOutputError> {
    for strategy in strategies {
        if let Some(value) = strategy.extract(raw) {
            tracing::debug!("Structured output recovered via {}", strategy.name());
            return Ok(value);
        }
    }
    Err(StructuredOutputError::Extraction {
        preview: preview(raw, PREVIEW_CHARS),
    })
}

/// Returns at most `max_chars` characters of `text`, marking truncation.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        let text = r#"noise {"a": "}{", "b": {"c": "\"}"}} trailing }"#;
        let value = BalancedObject.extract(text).expect("object");
        assert_eq!(value, json!({"a": "}{", "b": {"c": "\"}"}}));
    }

    #[test]
    fn unterminated_object_is_not_extracted() {
        assert!(BalancedObject.extract("{\"a\": 1").is_none());
    }

    #[test]
    fn fence_without_info_string_is_read() {
        let value = FencedBlock.extract("```\n{\"x\": 1}\n```").expect("fenced");
        assert_eq!(value, json!({"x": 1}));
    }

    #[test]
    fn nested_object_of_a_broken_outer_object_is_not_extracted() {
        let text = r#"x {"a": [{"b": 1},], "c": 2} y"#;
        assert!(BalancedObject.extract(text).is_none());
    }

    #[test]
    fn second_top_level_object_is_tried_after_a_broken_one() {
        let text = r#"{"a": 1,} then {"b": 2}"#;
        assert_eq!(BalancedObject.extract(text), Some(json!({"b": 2})));
    }

    #[test]
    fn non_object_json_does_not_stop_the_chain() {
        assert!(WholeText.extract("42").is_none());
        assert!(WholeText.extract("\"texto\"").is_none());
        let value = extract("```\n[1, 2]\n```\n{\"ok\": true}").expect("object");
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("ñandú", 2), "ña...");
        assert_eq!(preview("abc", 5), "abc");
    }
}
