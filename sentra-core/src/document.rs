// src/document.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A self-describing, schemaless document.
///
/// Every document carries a string `_id`, unique within its collection.
/// The remaining fields are free-form JSON.
///
/// Note: `#[serde(rename = "_id")]` + `#[serde(flatten)]` means `_id` lives
/// in `id`, never in `fields`. Query evaluation special-cases the `_id`
/// field through [`Document::id_value`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

impl Document {
    pub fn new(id: String, fields: HashMap<String, Value>) -> Self {
        Document { id, fields }
    }

    /// Build a document from a JSON object. A missing `_id` is synthesized
    /// as a UUID v4; a present `_id` must be a string.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("document must be a JSON object".to_string());
        };

        let id = match map.remove("_id") {
            None => Uuid::new_v4().to_string(),
            Some(Value::String(s)) => s,
            Some(other) => return Err(format!("_id must be a string, got {}", kind_name(&other))),
        };

        Ok(Document {
            id,
            fields: map.into_iter().collect(),
        })
    }

    /// Render the document as a JSON object, `_id` included.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len() + 1);
        map.insert("_id".to_string(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    /// The `_id` as a JSON value, for query matching.
    pub fn id_value(&self) -> Value {
        Value::String(self.id.clone())
    }

    /// Field lookup with dot-notation into nested objects and arrays,
    /// e.g. `get("details.addr")` or `get("tags.0")`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        if field.is_empty() {
            return None;
        }
        if !field.contains('.') {
            return self.fields.get(field);
        }

        let mut parts = field.split('.');
        let mut value = self.fields.get(parts.next().unwrap())?;
        for part in parts {
            value = match value {
                Value::Object(map) => map.get(part)?,
                Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(value)
    }

    pub fn set(&mut self, field: String, value: Value) {
        self.fields.insert(field, value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
