//! Source formats accepted by `Store::load`, chosen purely by file extension.

use std::ffi::OsStr;
use std::fmt::{self, Display};
use std::path::Path;

use serde_json::{Number, Value as JsonValue};
use thiserror::Error;

use crate::transcode::Mapping;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("top-level document must be a mapping, found {0}")]
    NotAMapping(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Toml,
}

impl SourceFormat {
    /// Format for `path`, based on its extension. Matching is case-sensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(OsStr::to_str) {
            Some("json") => Some(SourceFormat::Json),
            Some("toml") => Some(SourceFormat::Toml),
            _ => None,
        }
    }

    pub fn parse(self, text: &str) -> Result<Mapping, FormatError> {
        match self {
            SourceFormat::Json => match serde_json::from_str::<JsonValue>(text)? {
                JsonValue::Object(mapping) => Ok(mapping),
                other => Err(FormatError::NotAMapping(kind(&other))),
            },
            SourceFormat::Toml => {
                let table: toml::Table = toml::from_str(text)?;
                Ok(table
                    .into_iter()
                    .map(|(key, value)| (key, toml_to_json(value)))
                    .collect())
            }
        }
    }
}

impl Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Json => write!(f, "json"),
            SourceFormat::Toml => write!(f, "toml"),
        }
    }
}

/// Datetimes and non-finite floats have no JSON form and become strings.
fn toml_to_json(value: toml::Value) -> JsonValue {
    match value {
        toml::Value::String(text) => JsonValue::String(text),
        toml::Value::Integer(number) => JsonValue::from(number),
        toml::Value::Float(number) => Number::from_f64(number)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(number.to_string())),
        toml::Value::Boolean(flag) => JsonValue::Bool(flag),
        toml::Value::Datetime(stamp) => JsonValue::String(stamp.to_string()),
        toml::Value::Array(items) => JsonValue::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => JsonValue::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
