//! Reply repair and parsing: model text → rows.
//!
//! Even with "respond ONLY with JSON" in the prompt, models wrap replies in
//! ```` ```json ```` fences, and long statements run out of output tokens
//! mid-row. [`repair_reply`] is a pure text → text function that fixes both;
//! [`parse_rows`] then reads the row list. Neither touches the model, so
//! every heuristic here is covered by plain unit tests.
//!
//! ## Rule Order
//!
//! 1. Strip the code fence and its language tag
//! 2. Cut a truncated reply back to its last complete object
//! 3. Close every bracket still open at the cut point

use crate::error::{truncate_detail, StatementError};
use crate::output::{Cell, Row};
use crate::prompts::ROWS_FIELD;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Apply all repair rules to a raw reply.
///
/// Well-formed JSON passes through unchanged (modulo surrounding
/// whitespace), so repairing is always safe.
pub fn repair_reply(raw: &str) -> String {
    let s = strip_fences(raw);
    let s = cut_after_last_object(&s);
    close_open_brackets(&s)
}

/// Repair then parse.
pub fn parse_reply(raw: &str) -> Result<Vec<Row>, StatementError> {
    parse_rows(&repair_reply(raw))
}

// ── Rule 1: Strip code fences ────────────────────────────────────────────────

// Opening fence, optional language tag, then everything up to the closing
// fence (or the end, when the reply was cut before it).
static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)(?:```|\z)").unwrap());

fn strip_fences(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    match RE_FENCE.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 2: Truncation cut ───────────────────────────────────────────────────

/// A reply that does not end with its closing character was cut short;
/// keep everything up to the last complete `}`.
fn cut_after_last_object(input: &str) -> String {
    let expected = if input.starts_with('[') { ']' } else { '}' };
    if input.is_empty() || input.ends_with(expected) {
        return input.to_string();
    }
    match input.rfind('}') {
        Some(pos) if pos > 0 => input[..=pos].to_string(),
        _ => input.to_string(),
    }
}

// ── Rule 3: Close open brackets ──────────────────────────────────────────────

/// Append the closers for every `{`/`[` still open, ignoring brackets
/// inside string literals. Balanced input is returned as-is.
fn close_open_brackets(input: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
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
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() || in_string {
        return input.to_string();
    }
    let mut out = input.to_string();
    out.extend(stack.iter().rev());
    out
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Parse repaired text into rows.
///
/// Accepts `{"transactions": [...]}` (a missing or null field is an empty
/// list) or a bare top-level array. Non-object elements are skipped;
/// scalar values become text, `null` becomes an empty cell.
pub fn parse_rows(text: &str) -> Result<Vec<Row>, StatementError> {
    let value: Value = serde_json::from_str(text).map_err(|e| StatementError::Parse {
        detail: truncate_detail(&format!("{e}; reply starts with: {}", text.trim())),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(ROWS_FIELD) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(StatementError::Parse {
                    detail: format!("'{ROWS_FIELD}' is {}, not a list", kind(&other)),
                })
            }
        },
        other => {
            return Err(StatementError::Parse {
                detail: format!("expected an object or a list, got {}", kind(&other)),
            })
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, cell_text(v)))
                    .collect::<Row>(),
            ),
            _ => None,
        })
        .filter(|row| !row.is_empty())
        .collect())
}

fn cell_text(value: Value) -> Cell {
    match value {
        Value::Null => Cell::Text(String::new()),
        Value::String(s) => Cell::Text(s),
        other => Cell::Text(other.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"{"transactions": [
        {"date": "01/03", "description": "PAGO PSE", "amount": "-50.000,00"},
        {"date": "02/03", "description": "ABONO NOMINA", "amount": "2.500.000,00"}
    ]}"#;

    fn amounts(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|r| r.get("amount").and_then(Cell::as_text).unwrap_or("").to_string())
            .collect()
    }

    #[test]
    fn well_formed_is_idempotent() {
        assert_eq!(repair_reply(WELL_FORMED), WELL_FORMED.trim());
        assert_eq!(parse_reply(WELL_FORMED).unwrap(), parse_rows(WELL_FORMED).unwrap());
    }

    #[test]
    fn fence_with_language_tag_is_stripped() {
        let raw = format!("```json\n{WELL_FORMED}\n```");
        assert_eq!(repair_reply(&raw), WELL_FORMED.trim());
    }

    #[test]
    fn fence_without_tag_is_stripped() {
        let raw = format!("```\n{WELL_FORMED}\n```\n");
        assert_eq!(repair_reply(&raw), WELL_FORMED.trim());
    }

    #[test]
    fn fence_tag_on_same_line_as_content() {
        assert_eq!(repair_reply("```json{\"transactions\": []}```"), "{\"transactions\": []}");
    }

    #[test]
    fn truncated_reply_keeps_complete_rows() {
        let raw = r#"```json
{"transactions": [
  {"date": "01/03", "amount": "1.000,00"},
  {"date": "02/03", "amount": "2.000,00"},
  {"date": "03/03", "amou"#;
        let rows = parse_reply(raw).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(amounts(&rows), vec!["1.000,00", "2.000,00"]);
    }

    #[test]
    fn truncation_inside_nested_values() {
        let raw = r#"{"transactions": [{"date": "01/03", "tags": ["a", "b"]}, {"date": "0"#;
        let repaired = repair_reply(raw);
        assert_eq!(repaired, r#"{"transactions": [{"date": "01/03", "tags": ["a", "b"]}]}"#);
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let raw = r#"{"transactions": [{"description": "COMPRA {TIENDA] [X"}, {"d"#;
        let rows = parse_reply(raw).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get("description"),
            Some(&Cell::from("COMPRA {TIENDA] [X"))
        );
    }

    #[test]
    fn missing_field_is_empty_not_error() {
        assert!(parse_reply(r#"{"note": "no movements"}"#).unwrap().is_empty());
        assert!(parse_reply(r#"{"transactions": null}"#).unwrap().is_empty());
    }

    #[test]
    fn bare_array_is_accepted() {
        let rows = parse_reply(r#"[{"date": "01/03"}, 7, {"date": "02/03"}]"#).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn scalars_become_text() {
        let rows = parse_reply(r#"{"transactions": [{"amount": 1500.5, "branch": null, "ok": true}]}"#)
            .unwrap();
        assert_eq!(rows[0].get("amount"), Some(&Cell::from("1500.5")));
        assert_eq!(rows[0].get("branch"), Some(&Cell::from("")));
        assert_eq!(rows[0].get("ok"), Some(&Cell::from("true")));
    }

    #[test]
    fn key_order_is_preserved() {
        let rows = parse_reply(r#"[{"zeta": "1", "alpha": "2"}]"#).unwrap();
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn prose_is_a_parse_error() {
        let err = parse_reply("I could not find any transactions in this image.").unwrap_err();
        assert!(matches!(err, StatementError::Parse { .. }));
    }

    #[test]
    fn wrong_field_type_is_a_parse_error() {
        let err = parse_reply(r#"{"transactions": "none"}"#).unwrap_err();
        assert!(err.to_string().contains("a string"));
    }
}
