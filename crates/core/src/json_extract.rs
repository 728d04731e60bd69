//! Lenient JSON extraction from model output
//!
//! Models asked for JSON still wrap it in markdown fences or prose now and
//! then. [`extract`] pulls the first JSON object out of such text and always
//! returns something that parses.

use serde_json::Value;

/// Returned when no object can be found
pub const EMPTY_OBJECT: &str = "{}";

/// Extract the first JSON object from free-form text
///
/// Tries, in order: the contents of each fenced code block, then every
/// brace-balanced substring of the whole text. Falls back to `"{}"`.
pub fn extract(text: &str) -> String {
    let trimmed = text.trim();

    if parses_as_object(trimmed) {
        return trimmed.to_string();
    }

    for block in fenced_blocks(trimmed) {
        if parses_as_object(block) {
            return block.to_string();
        }
    }

    balanced_objects(trimmed)
        .find(|candidate| parses_as_object(candidate))
        .map(str::to_string)
        .unwrap_or_else(|| EMPTY_OBJECT.to_string())
}

/// Same as [`extract`] but returns the parsed value
pub fn extract_value(text: &str) -> Value {
    serde_json::from_str(&extract(text)).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn parses_as_object(text: &str) -> bool {
    matches!(serde_json::from_str::<Value>(text), Ok(Value::Object(_)))
}

/// Contents of each ``` fenced block, language tag removed
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            break;
        };
        let mut body = &after_open[..close];

        // Drop an info string such as `json` on the opening line
        if let Some(newline) = body.find('\n') {
            let tag = body[..newline].trim();
            if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                body = &body[newline + 1..];
            }
        } else if let Some(stripped) = body.strip_prefix("json") {
            body = stripped;
        }

        blocks.push(body.trim());
        rest = &after_open[close + 3..];
    }

    blocks
}

/// Iterate over brace-balanced `{...}` substrings, outermost first
///
/// Braces inside string literals are ignored.
fn balanced_objects(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(move |(start, _)| balanced_from(text, start))
}

fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
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
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
