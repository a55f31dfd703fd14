//! Post-processing: turn a raw model reply into a JSON object.
//!
//! The prompt asks for bare JSON, but models still occasionally:
//!
//! - wrap the object in a ` ```json ... ``` ` fence,
//! - prefix it with a sentence ("Here is the extracted data:"),
//! - emit a BOM or zero-width characters.
//!
//! Rules run in order: strip invisible characters, strip an outer fence,
//! parse; if parsing fails, retry on the span between the first `{` and the
//! last `}`. Anything that is still not a JSON object is rejected.

use crate::error::ReceiptOcrError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Parse the model's reply into a JSON object.
pub fn parse_model_json(raw: &str) -> Result<Value, ReceiptOcrError> {
    let s = remove_invisible_chars(raw);
    let s = strip_code_fences(&s);
    let s = s.trim();

    if s.is_empty() {
        return Err(invalid("empty reply"));
    }

    let value = match serde_json::from_str::<Value>(s) {
        Ok(v) => v,
        Err(first_err) => match outermost_object(s) {
            Some(span) => serde_json::from_str::<Value>(span)
                .map_err(|e| invalid(&format!("{} (reply starts {:?})", e, preview(s))))?,
            None => {
                return Err(invalid(&format!(
                    "{} (reply starts {:?})",
                    first_err,
                    preview(s)
                )))
            }
        },
    };

    if !value.is_object() {
        return Err(invalid("expected a JSON object"));
    }
    Ok(value)
}

fn invalid(detail: &str) -> ReceiptOcrError {
    ReceiptOcrError::InvalidModelOutput {
        detail: detail.to_string(),
    }
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 2: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rule 3: Fall back to the outermost object ───────────────────────────────

fn outermost_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

fn preview(s: &str) -> String {
    s.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_object() {
        let v = parse_model_json(r#"{"Client": {"FirstName": "Ann"}}"#).unwrap();
        assert_eq!(v["Client"]["FirstName"], "Ann");
    }

    #[test]
    fn fenced_object() {
        let raw = "```json\n{\"Patients\": []}\n```";
        assert_eq!(parse_model_json(raw).unwrap(), json!({ "Patients": [] }));

        let raw = "```\n{\"Patients\": []}\n```\n";
        assert_eq!(parse_model_json(raw).unwrap(), json!({ "Patients": [] }));
    }

    #[test]
    fn leading_prose_and_bom() {
        let raw = "\u{FEFF}Here is the extracted data:\n{\"Client\": {}}\nLet me know!";
        assert_eq!(parse_model_json(raw).unwrap(), json!({ "Client": {} }));
    }

    #[test]
    fn rejects_non_object() {
        let err = parse_model_json("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ReceiptOcrError::InvalidModelOutput { .. }));
    }

    #[test]
    fn rejects_prose() {
        let err = parse_model_json("I cannot read this document.").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"), "got: {err}");
    }

    #[test]
    fn rejects_empty() {
        let err = parse_model_json("  \n ").unwrap_err();
        assert!(err.to_string().contains("empty reply"), "got: {err}");
    }
}
