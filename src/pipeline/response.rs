//! Response parsing: model reply envelope → label string.
//!
//! The reply travels as a Messages-API envelope whose first content block
//! carries the model text. That text should be a JSON object with a
//! `ContentType` field, but models add quirks, so a few deterministic rules
//! run before the JSON parse:
//!
//! 1. Strip control characters (C0, DEL and C1). Raw newlines inside JSON
//!    strings are invalid anyway.
//! 2. Strip an outer ` ```json ... ``` ` fence the prompt did not ask for.
//!
//! A reply that still fails is a [`ParsedResponse::ParseError`] value, never
//! a panic or an `Err`: the caller decides what a broken reply means.

use crate::prompts::LABEL_FIELD;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Optional free-text fields some prompts ask the model to fill.
const REASONING_FIELDS: [&str; 2] = ["ThoughtProcess", "Reasoning"];

const PARSE_ERROR_PREFIX: &str = "failed to parse response: ";

/// Result of interpreting one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    Labelled {
        /// Label exactly as the model wrote it.
        label: String,
        /// The reply object, re-serialised compactly.
        raw_json: String,
        reasoning: Option<String>,
    },
    /// Diagnostic starting with `failed to parse response: `.
    ParseError(String),
}

/// Parse a raw response body.
pub fn parse_response(body: &str) -> ParsedResponse {
    match try_parse(body) {
        Ok(parsed) => parsed,
        Err(cause) => ParsedResponse::ParseError(format!("{PARSE_ERROR_PREFIX}{cause}")),
    }
}

fn try_parse(body: &str) -> Result<ParsedResponse, String> {
    let envelope: Value =
        serde_json::from_str(body).map_err(|e| format!("invalid envelope JSON: {e}"))?;

    let text = envelope
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .ok_or("envelope has no content blocks")?
        .get("text")
        .and_then(Value::as_str)
        .ok_or("first content block has no text")?;

    let cleaned = strip_json_fence(&strip_control_chars(text));

    let object: Value =
        serde_json::from_str(&cleaned).map_err(|e| format!("reply is not JSON: {e}"))?;
    let fields = object.as_object().ok_or("reply is not a JSON object")?;

    let label = fields
        .get(LABEL_FIELD)
        .ok_or_else(|| format!("missing {LABEL_FIELD} field"))?
        .as_str()
        .ok_or_else(|| format!("{LABEL_FIELD} is not a string"))?
        .to_string();

    let reasoning = REASONING_FIELDS
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    let raw_json = serde_json::to_string(&object).map_err(|e| e.to_string())?;

    Ok(ParsedResponse::Labelled {
        label,
        raw_json,
        reasoning,
    })
}

// ── Rule 1: control characters ───────────────────────────────────────────────

fn strip_control_chars(input: &str) -> String {
    input.chars().filter(|c| !c.is_control()).collect()
}

// ── Rule 2: outer code fence ─────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*(.*?)\s*```$").unwrap());

fn strip_json_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_JSON_FENCE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(text: &str) -> String {
        serde_json::json!({
            "id": "msg_01",
            "type": "message",
            "content": [{ "type": "text", "text": text }],
        })
        .to_string()
    }

    fn label_of(parsed: ParsedResponse) -> String {
        match parsed {
            ParsedResponse::Labelled { label, .. } => label,
            ParsedResponse::ParseError(e) => panic!("unexpected parse error: {e}"),
        }
    }

    #[test]
    fn parses_plain_reply() {
        let parsed = parse_response(&envelope(r#"{"ContentType": "Rental_Contract"}"#));
        match parsed {
            ParsedResponse::Labelled {
                label,
                raw_json,
                reasoning,
            } => {
                assert_eq!(label, "Rental_Contract");
                assert_eq!(raw_json, r#"{"ContentType":"Rental_Contract"}"#);
                assert_eq!(reasoning, None);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn strips_control_chars_and_newlines() {
        let text = "{\n  \"ContentType\":\u{0007} \"Repayment_Table\"\u{0085}\n}\r\n";
        assert_eq!(label_of(parse_response(&envelope(text))), "Repayment_Table");
    }

    #[test]
    fn strips_outer_fence() {
        let text = "```json\n{\"ContentType\": \"Contract_Payment\"}\n```";
        assert_eq!(label_of(parse_response(&envelope(text))), "Contract_Payment");
        let bare = "```\n{\"ContentType\": \"Unclassified\"}\n```";
        assert_eq!(label_of(parse_response(&envelope(bare))), "Unclassified");
    }

    #[test]
    fn keeps_reasoning() {
        let text = r#"{"ThoughtProcess": "page 2 shows a lease", "ContentType": "Rental_Contract"}"#;
        match parse_response(&envelope(text)) {
            ParsedResponse::Labelled { reasoning, .. } => {
                assert_eq!(reasoning.as_deref(), Some("page 2 shows a lease"))
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn label_is_returned_verbatim() {
        let parsed = parse_response(&envelope(r#"{"ContentType": "rental_contract"}"#));
        assert_eq!(label_of(parsed), "rental_contract");
    }

    #[test]
    fn failures_are_values() {
        let cases = [
            "not json at all".to_string(),
            r#"{"content": []}"#.to_string(),
            r#"{"content": [{"type": "image"}]}"#.to_string(),
            envelope("The document is a rental contract."),
            envelope(r#"["Rental_Contract"]"#),
            envelope(r#"{"Type": "Rental_Contract"}"#),
            envelope(r#"{"ContentType": 7}"#),
        ];
        for body in cases {
            match parse_response(&body) {
                ParsedResponse::ParseError(msg) => {
                    assert!(msg.starts_with("failed to parse response: "), "{msg}")
                }
                other => panic!("expected parse error for {body}: {other:?}"),
            }
        }
    }
}
