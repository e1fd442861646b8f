// sentra-server/src/protocol.rs
// Wire types. One JSON object per line in each direction (NDJSON); a final
// unterminated request before EOF is accepted too.

use sentra_core::FindOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Find,
    Insert,
    Update,
    Delete,
}

/// A request against one collection.
///
/// `query` selects documents for find/update/delete; `data` carries the
/// documents to insert, or the patch (first element) for update. The
/// remaining fields refine find results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub database: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<HashMap<String, i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<HashMap<String, i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
}

impl Request {
    pub fn find_options(&self) -> FindOptions {
        let mut options = FindOptions::new();
        if let Some(projection) = &self.projection {
            options.projection = Some(projection.clone());
        }
        if let Some(sort) = &self.sort {
            options.sort = Some(sort.iter().map(|(f, d)| (f.clone(), *d)).collect());
        }
        options.limit = self.limit;
        options.skip = self.skip;
        options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
}

impl Response {
    pub fn ok_count(count: usize) -> Self {
        Response {
            status: Status::Ok,
            message: None,
            count: Some(count),
            data: None,
        }
    }

    pub fn ok_data(data: Vec<Value>) -> Self {
        Response {
            status: Status::Ok,
            message: None,
            count: Some(data.len()),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response {
            status: Status::Error,
            message: Some(message.into()),
            count: None,
            data: None,
        }
    }
}
