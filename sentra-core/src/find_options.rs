// sentra-core/src/find_options.rs
// Find query options: projection, sort, limit, skip

use crate::error::{Result, StoreError};
use crate::value_utils::{get_nested_value, sort_cmp};
use serde_json::Value;
use std::collections::HashMap;

/// Options for find queries
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Projection: field -> 1 (include) or 0 (exclude).
    /// Include-only or exclude-only; `_id` may additionally be excluded in
    /// include mode.
    pub projection: Option<HashMap<String, i32>>,

    /// Sort: [(field, direction)], direction 1 (asc) or -1 (desc).
    pub sort: Option<Vec<(String, i32)>>,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Number of documents to skip (pagination).
    pub skip: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: HashMap<String, i32>) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: Vec<(String, i32)>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Reject projections that mix inclusions and exclusions (the `_id: 0`
/// escape hatch aside).
pub fn validate_projection(projection: &HashMap<String, i32>) -> Result<()> {
    let has_inclusions = projection.values().any(|&v| v == 1);
    let has_non_id_exclusions = projection
        .iter()
        .any(|(field, &action)| action == 0 && field != "_id");
    if has_inclusions && has_non_id_exclusions {
        return Err(StoreError::InvalidQuery(
            "projection cannot mix inclusion and exclusion".to_string(),
        ));
    }
    Ok(())
}

/// Apply projection to a document rendered as a JSON object.
/// Supports dot notation for nested fields in include mode.
pub fn apply_projection(doc: &Value, projection: &HashMap<String, i32>) -> Value {
    if projection.is_empty() {
        return doc.clone();
    }

    let include_mode = projection.values().any(|&v| v == 1);

    let Value::Object(obj) = doc else {
        return doc.clone();
    };
    let mut result = serde_json::Map::new();

    if include_mode {
        for (field, &action) in projection {
            if action == 1 {
                if let Some(value) = get_nested_value(doc, field) {
                    result.insert(field.clone(), value.clone());
                }
            }
        }
        // _id rides along unless explicitly excluded
        if projection.get("_id") != Some(&0) {
            if let Some(id) = obj.get("_id") {
                result.insert("_id".to_string(), id.clone());
            }
        }
    } else {
        // Exclude mode: top-level fields only.
        for (key, value) in obj {
            if projection.get(key) != Some(&0) {
                result.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(result)
}

/// Stable sort over rendered documents. Within one field, values order by
/// kind rank then value; a missing field sorts first.
pub fn apply_sort(docs: &mut [Value], sort: &[(String, i32)]) {
    if sort.is_empty() {
        return;
    }

    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let cmp = sort_cmp(get_nested_value(a, field), get_nested_value(b, field));
            if cmp != std::cmp::Ordering::Equal {
                return if *direction >= 0 { cmp } else { cmp.reverse() };
            }
        }
        std::cmp::Ordering::Equal
    });
}
