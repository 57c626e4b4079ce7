//! Shared domain enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a template field, as stored in the `field_type` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Textarea,
    Richtext,
    Number,
    Boolean,
    Select,
    Media,
    MediaList,
    List,
    Items,
    LinkedItems,
    Object,
    /// Any type name this crate does not know; values pass through untouched.
    Other(String),
}

impl FieldType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "textarea" => Self::Textarea,
            "richtext" | "rich_text" => Self::Richtext,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "select" => Self::Select,
            "media" => Self::Media,
            "media_list" => Self::MediaList,
            "list" => Self::List,
            "items" => Self::Items,
            "linked_items" => Self::LinkedItems,
            "object" => Self::Object,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Richtext => "richtext",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Select => "select",
            Self::Media => "media",
            Self::MediaList => "media_list",
            Self::List => "list",
            Self::Items => "items",
            Self::LinkedItems => "linked_items",
            Self::Object => "object",
            Self::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_linked_items(&self) -> bool {
        matches!(self, Self::Items | Self::LinkedItems)
    }
}

impl From<&str> for FieldType {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// How string values stored in boolean fields are coerced.
///
/// `JsTruthy` keeps the legacy contract where any non-empty string, including
/// `"false"`, is true. `Strict` recognises the usual negative spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanPolicy {
    #[default]
    #[serde(alias = "truthy")]
    JsTruthy,
    Strict,
}

impl BooleanPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "truthy" | "js_truthy" => Some(Self::JsTruthy),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}
