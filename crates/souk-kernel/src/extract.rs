//! Structured response parser.
//!
//! The inference service returns free text that is supposed to contain either
//! a fenced ```json block or `**Key:** value` lines. Neither can be trusted:
//! reasoning models interleave `<think>` blocks, keys go missing, and values
//! drift outside their domain. Every extraction therefore lands on a
//! well-typed value, with out-of-domain input collapsed to the key's fallback
//! and the anomaly logged.

use souk_contracts::{Intent, IssueCategory, Language};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    Intent,
    Items,
    IssueProduct,
    Address,
    Products,
    Category,
    Language,
    Response,
}

impl FieldKey {
    pub fn tag(self) -> &'static str {
        match self {
            FieldKey::Intent => "**Intent:**",
            FieldKey::Items => "**Items:**",
            FieldKey::IssueProduct => "**IssueProduct:**",
            FieldKey::Address => "**Address:**",
            FieldKey::Products => "**Products:**",
            FieldKey::Category => "**Category:**",
            FieldKey::Language => "**Language:**",
            FieldKey::Response => "**Response:**",
        }
    }

    fn json_name(self) -> &'static str {
        match self {
            FieldKey::Intent => "intent",
            FieldKey::Items => "items",
            FieldKey::IssueProduct => "issue_product",
            FieldKey::Address => "address",
            FieldKey::Products => "products",
            FieldKey::Category => "category",
            FieldKey::Language => "language",
            FieldKey::Response => "response",
        }
    }

    fn is_list(self) -> bool {
        matches!(
            self,
            FieldKey::Items | FieldKey::IssueProduct | FieldKey::Products
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedValue {
    Text(String),
    List(Vec<String>),
    Empty,
}

/// Extract one field from a raw completion. Never fails: when neither the
/// fenced-block nor the line-tag interpretation matches, the key's empty
/// value comes back and the anomaly is logged.
pub fn extract_field(raw: &str, key: FieldKey) -> ParsedValue {
    let cleaned = strip_reasoning(raw);

    if let Some(value) = from_fenced_json(&cleaned, key) {
        return normalize(value, key);
    }
    if let Some(value) = from_line_tag(&cleaned, key) {
        return normalize(value, key);
    }

    warn!(key = key.tag(), "completion missing expected field");
    if key.is_list() {
        ParsedValue::List(Vec::new())
    } else {
        ParsedValue::Empty
    }
}

/// Intent with the untrusted-generator safety net: anything outside the
/// closed domain is `None`, never propagated raw into routing.
pub fn intent(raw: &str) -> Intent {
    match extract_field(raw, FieldKey::Intent) {
        ParsedValue::Text(value) => Intent::parse(&value).unwrap_or_else(|| {
            warn!(value, "out-of-domain intent, defaulting to none");
            Intent::None
        }),
        _ => Intent::None,
    }
}

pub fn language(raw: &str) -> Language {
    match extract_field(raw, FieldKey::Language) {
        ParsedValue::Text(value) => Language::parse(&value).unwrap_or_else(|| {
            warn!(value, "out-of-domain language, defaulting to english");
            Language::English
        }),
        _ => Language::English,
    }
}

pub fn category(raw: &str) -> IssueCategory {
    match extract_field(raw, FieldKey::Category) {
        ParsedValue::Text(value) => IssueCategory::parse(&value).unwrap_or_else(|| {
            warn!(value, "out-of-domain issue category, defaulting to other");
            IssueCategory::Other
        }),
        _ => IssueCategory::Other,
    }
}

/// Item-style keys always come back as a list, possibly empty. A bare `none`
/// yields an empty list, not a one-element list containing "none".
pub fn items(raw: &str, key: FieldKey) -> Vec<String> {
    match extract_field(raw, key) {
        ParsedValue::List(values) => values,
        ParsedValue::Text(value) => explode_list(&value),
        ParsedValue::Empty => Vec::new(),
    }
}

/// User-facing reply text, verbatim but trimmed.
pub fn response(raw: &str) -> Option<String> {
    match extract_field(raw, FieldKey::Response) {
        ParsedValue::Text(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

pub fn address(raw: &str) -> Option<String> {
    match extract_field(raw, FieldKey::Address) {
        ParsedValue::Text(value) if !is_none_marker(&value) => Some(value),
        _ => None,
    }
}

/// The parsed fenced ```json block, when one is present and valid. Used for
/// candidates that are whole JSON documents rather than tagged lines.
pub fn fenced_json(raw: &str) -> Option<serde_json::Value> {
    let cleaned = strip_reasoning(raw);
    let block = fenced_block(&cleaned)?;
    serde_json::from_str(block).ok()
}

/// Drop `<think>...</think>` blocks emitted by reasoning models before any
/// structural interpretation. An unterminated block swallows the rest.
fn strip_reasoning(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let end = text[start..].find("```")?;
    Some(text[start..start + end].trim())
}

fn from_fenced_json(text: &str, key: FieldKey) -> Option<ParsedValue> {
    let value: serde_json::Value = serde_json::from_str(fenced_block(text)?).ok()?;
    match value.get(key.json_name())? {
        serde_json::Value::String(s) => Some(ParsedValue::Text(s.clone())),
        serde_json::Value::Array(entries) => Some(ParsedValue::List(
            entries
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect(),
        )),
        _ => None,
    }
}

fn from_line_tag(text: &str, key: FieldKey) -> Option<ParsedValue> {
    let idx = text.rfind(key.tag())?;
    let after = &text[idx + key.tag().len()..];
    let value = match after.find("**") {
        Some(cut) => &after[..cut],
        None => after,
    };
    Some(ParsedValue::Text(value.trim().to_string()))
}

fn normalize(value: ParsedValue, key: FieldKey) -> ParsedValue {
    match (value, key.is_list()) {
        (ParsedValue::Text(s), true) => ParsedValue::List(explode_list(&s)),
        (ParsedValue::List(entries), true) => ParsedValue::List(
            entries
                .iter()
                .flat_map(|entry| explode_list(entry))
                .collect(),
        ),
        (ParsedValue::Text(s), false) => {
            if s.trim().is_empty() {
                ParsedValue::Empty
            } else {
                ParsedValue::Text(s.trim().to_string())
            }
        }
        (other, _) => other,
    }
}

fn explode_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty() && !is_none_marker(item))
        .map(|item| item.to_string())
        .collect()
}

fn is_none_marker(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    lowered.is_empty() || lowered == "none" || lowered == "non-relevant" || lowered == "aucun"
}
