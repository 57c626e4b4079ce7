//! Field processor: coerces raw stored values into typed, client-ready values.
//!
//! Values are decoded once here into [`FieldValue`]; nothing downstream sniffs
//! JSON shapes again. All functions are pure.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::types::{BooleanPolicy, FieldType};

/// Start of a `key :` pair inside a single line, e.g. the ` fr :` in `en : 🇬🇧 fr : 🇫🇷`.
static PAIR_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[A-Za-z0-9_]+\s*:").expect("pair boundary pattern is valid"));

/// A fully typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<ListEntry>),
    Bool(bool),
    Number(f64),
    /// Single media reference; `None` when the stored array was empty.
    Media(Option<Value>),
    MediaList(Vec<Value>),
    Items(Vec<ItemEntry>),
    /// Values of unknown or structured types, passed through unchanged.
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListEntry {
    Pair { key: String, value: String },
    Token(String),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemEntry {
    Resolved(LinkedItem),
    /// Entry of an items array stored inline in section data.
    Reference(Value),
}

/// A linked item flattened for clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedItem {
    pub item: ItemSummary,
    pub data: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "templateSlug", skip_serializing_if = "Option::is_none")]
    pub template_slug: Option<String>,
    #[serde(rename = "baseItemId", skip_serializing_if = "Option::is_none")]
    pub base_item_id: Option<Uuid>,
}

impl FieldValue {
    pub fn empty_items() -> Self {
        Self::Items(Vec::new())
    }
}

/// Coerce `raw` according to the declared field type.
pub fn process_value(raw: &Value, field_type: &FieldType, policy: BooleanPolicy) -> FieldValue {
    match field_type {
        FieldType::List => FieldValue::List(normalize_list(list_entries(raw))),
        FieldType::Items | FieldType::LinkedItems => match raw {
            Value::Array(values) => {
                FieldValue::Items(values.iter().cloned().map(ItemEntry::Reference).collect())
            }
            _ => FieldValue::empty_items(),
        },
        FieldType::Boolean => FieldValue::Bool(coerce_bool(raw, policy)),
        FieldType::Number => FieldValue::Number(coerce_number(raw)),
        FieldType::Media => coerce_media(raw),
        FieldType::MediaList => coerce_media_list(raw),
        _ => passthrough(raw),
    }
}

/// Value of an unknown or untyped field, kept as stored.
pub fn passthrough(raw: &Value) -> FieldValue {
    match raw {
        Value::String(text) => FieldValue::Text(text.clone()),
        other => FieldValue::Raw(other.clone()),
    }
}

fn list_entries(raw: &Value) -> Vec<ListEntry> {
    match raw {
        Value::Array(values) => values.iter().map(list_entry_from_value).collect(),
        Value::String(text) => parse_list(text),
        Value::Null => Vec::new(),
        other => vec![ListEntry::Other(other.clone())],
    }
}

fn list_entry_from_value(value: &Value) -> ListEntry {
    match value {
        Value::String(text) => ListEntry::Token(text.clone()),
        Value::Object(map) => match (map.get("key"), map.get("value")) {
            (Some(Value::String(key)), Some(Value::String(value))) => ListEntry::Pair {
                key: key.clone(),
                value: value.clone(),
            },
            _ => ListEntry::Other(value.clone()),
        },
        other => ListEntry::Other(other.clone()),
    }
}

/// Split a stored list string into entries.
///
/// Multi-line input splits on newlines. A single line splits at every `word :`
/// boundary so `en : 🇬🇧 fr : 🇫🇷` yields two pairs.
pub fn parse_list(raw: &str) -> Vec<ListEntry> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = if raw.contains('\n') {
        raw.lines().collect()
    } else {
        split_single_line(raw)
    };

    lines
        .into_iter()
        .filter_map(|line| {
            let line = line.trim();
            (!line.is_empty()).then(|| parse_list_line(line))
        })
        .collect()
}

fn split_single_line(line: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for boundary in PAIR_BOUNDARY.find_iter(line) {
        if boundary.start() > start {
            parts.push(&line[start..boundary.start()]);
            start = boundary.start();
        }
    }
    parts.push(&line[start..]);
    parts
}

fn parse_list_line(line: &str) -> ListEntry {
    if let Some((key, value)) = line.split_once(':') {
        let key = key.trim();
        let value = value.trim();
        if !key.is_empty() && !value.is_empty() {
            return ListEntry::Pair {
                key: key.to_string(),
                value: value.to_string(),
            };
        }
    }
    ListEntry::Token(line.to_string())
}

/// Second pass over list entries: trims tokens, drops empty ones and re-splits
/// tokens that still carry raw newlines, whichever path produced them.
pub fn normalize_list(entries: Vec<ListEntry>) -> Vec<ListEntry> {
    let mut normalized = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            ListEntry::Token(token) if token.contains('\n') => {
                normalized.extend(parse_list(&token));
            }
            ListEntry::Token(token) => {
                let trimmed = token.trim();
                if !trimmed.is_empty() {
                    normalized.push(ListEntry::Token(trimmed.to_string()));
                }
            }
            ListEntry::Pair { key, value } => normalized.push(ListEntry::Pair {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            other => normalized.push(other),
        }
    }
    normalized
}

fn coerce_bool(raw: &Value, policy: BooleanPolicy) -> bool {
    match raw {
        Value::Bool(flag) => *flag,
        Value::String(text) => match policy {
            BooleanPolicy::JsTruthy => !text.is_empty(),
            BooleanPolicy::Strict => !matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "" | "false" | "0" | "no" | "off"
            ),
        },
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn coerce_number(raw: &Value) -> f64 {
    let parsed = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn coerce_media(raw: &Value) -> FieldValue {
    match decode_media(raw) {
        Some(Value::Array(values)) => FieldValue::Media(values.into_iter().next()),
        Some(Value::Null) => FieldValue::Media(None),
        Some(other) => FieldValue::Media(Some(other)),
        None => passthrough(raw),
    }
}

fn coerce_media_list(raw: &Value) -> FieldValue {
    match decode_media(raw) {
        Some(Value::Array(values)) => FieldValue::MediaList(values),
        Some(Value::Null) => FieldValue::MediaList(Vec::new()),
        Some(other) => FieldValue::MediaList(vec![other]),
        None => passthrough(raw),
    }
}

/// Media values are usually stored as a JSON-encoded array of ids. Returns `None`
/// for strings that are not valid JSON so callers keep the raw value.
fn decode_media(raw: &Value) -> Option<Value> {
    match raw {
        Value::String(text) => serde_json::from_str::<Value>(text).ok(),
        other => Some(other.clone()),
    }
}
