//! Record model
//!
//! A record is one row read from the source backend: an untyped mapping from
//! field name to JSON value. Field types are not checked here; the target
//! procedure is the only validator.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One source row, keyed by field name
///
/// A field is *blank* when it is absent, JSON `null`, or a string containing
/// only whitespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Build a record from a decoded JSON value
    ///
    /// Fails unless the value is a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::InvalidInput(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// True when the field is absent, null, or an empty/whitespace string
    pub fn is_blank(&self, field: &str) -> bool {
        match self.0.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        }
    }

    /// Text rendering of a field, `None` when blank
    ///
    /// Strings are returned as-is, numbers and booleans in their JSON
    /// spelling, nested arrays/objects as compact JSON.
    pub fn text(&self, field: &str) -> Option<String> {
        if self.is_blank(field) {
            return None;
        }
        self.0.get(field).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
