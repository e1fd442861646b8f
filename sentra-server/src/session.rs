// sentra-server/src/session.rs
// Per-connection request dispatch. Every failure becomes a status=error
// response; only framing-level problems tear a connection down.

use std::sync::Arc;

use sentra_core::{Collection, CollectionManager, Result};
use serde_json::{json, Value};

use crate::protocol::{Operation, Request, Response};

pub struct Session {
    manager: Arc<CollectionManager>,
}

impl Session {
    pub fn new(manager: Arc<CollectionManager>) -> Self {
        Session { manager }
    }

    pub fn handle(&self, request: Request) -> Response {
        let result = match request.operation {
            Operation::Find => self.find(&request),
            Operation::Insert => self.insert(&request),
            Operation::Update => self.update(&request),
            Operation::Delete => self.delete(&request),
        };
        match result {
            Ok(response) => response,
            Err(e) => Response::error(e.to_string()),
        }
    }

    fn collection(&self, request: &Request) -> Result<Arc<Collection>> {
        self.manager.get_collection(&request.database)
    }

    fn find(&self, request: &Request) -> Result<Response> {
        let collection = self.collection(request)?;
        let query = request.query.clone().unwrap_or_else(|| json!({}));
        let docs = collection.find(&query, &request.find_options())?;
        Ok(Response::ok_data(docs))
    }

    fn insert(&self, request: &Request) -> Result<Response> {
        let collection = self.collection(request)?;
        let data = match &request.data {
            Some(data) if !data.is_empty() => data.clone(),
            _ => {
                return Ok(Response::error("insert requires a non-empty data array"));
            }
        };

        let ids = collection.insert_many(data)?;
        self.flush(&collection)?;
        Ok(Response::ok_count(ids.len()))
    }

    fn update(&self, request: &Request) -> Result<Response> {
        let collection = self.collection(request)?;
        let query = request.query.clone().unwrap_or_else(|| json!({}));
        let patch: &Value = match request.data.as_deref() {
            Some([patch]) => patch,
            _ => {
                return Ok(Response::error(
                    "update requires a data array holding exactly one patch document",
                ));
            }
        };

        let count = collection.update(&query, patch)?;
        self.flush(&collection)?;
        Ok(Response::ok_count(count))
    }

    fn delete(&self, request: &Request) -> Result<Response> {
        let collection = self.collection(request)?;
        let query = request.query.clone().unwrap_or_else(|| json!({}));
        let count = collection.delete(&query)?;
        self.flush(&collection)?;
        Ok(Response::ok_count(count))
    }

    // Flush-on-request durability: every mutating request persists the
    // collection before the response goes out.
    fn flush(&self, collection: &Collection) -> Result<()> {
        collection.save()?;
        collection.save_indexes()
    }
}
