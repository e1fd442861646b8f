// sentra-core/src/collection.rs
// A named bag of documents plus secondary indexes and persistence.
//
// Layout on disk:
//   <dir>/documents.json   - pretty-printed JSON array, insertion order
//   <dir>/indexes/<f>.idx  - length-prefixed (key, ids) records
//
// Concurrency: one RW lock over the whole collection. Mutators take it in
// write mode, find/count in read mode. Coarse, but it matches the
// one-connection-per-query load pattern; per-bucket sharding stays a
// future optimization.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::find_options::{apply_projection, apply_sort, validate_projection, FindOptions};
use crate::index::Index;
use crate::query::{matches_document, plan, Candidates};
use crate::storage::HashTable;
use crate::{log_debug, log_info, log_warn};

/// Serialized size ceiling for a single document.
pub const MAX_DOCUMENT_BYTES: usize = 1 << 20;

const DOCUMENTS_FILE: &str = "documents.json";
const INDEX_DIR: &str = "indexes";
const INDEX_EXT: &str = "idx";

struct CollectionState {
    docs: HashTable<Document>,
    /// Insertion-order log for stable iteration. A replacing insert keeps
    /// the original position.
    order: Vec<String>,
    indexes: BTreeMap<String, Index>,
}

/// A named collection of documents.
pub struct Collection {
    name: String,
    dir: PathBuf,
    state: RwLock<CollectionState>,
}

impl Collection {
    /// Open the collection backed by `dir`, loading any persisted state.
    /// Missing files mean an empty collection, not an error.
    pub fn open(name: impl Into<String>, dir: impl Into<PathBuf>) -> Result<Collection> {
        let name = name.into();
        let dir = dir.into();

        let (docs, order) = load_documents(&dir)?;
        let mut indexes = BTreeMap::new();

        let index_dir = dir.join(INDEX_DIR);
        if index_dir.is_dir() {
            for entry in fs::read_dir(&index_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(INDEX_EXT) {
                    continue;
                }
                let Some(field) = path.file_stem().and_then(|s| s.to_str()).map(String::from)
                else {
                    continue;
                };
                let index =
                    Index::load_or_build(&field, &path, order.iter().filter_map(|id| docs.get(id)));
                indexes.insert(field, index);
            }
        }

        log_info!(
            "collection '{}' opened: {} documents, {} indexes",
            name,
            docs.len(),
            indexes.len()
        );

        Ok(Collection {
            name,
            dir,
            state: RwLock::new(CollectionState {
                docs,
                order,
                indexes,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.state.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert one document; a duplicate `_id` replaces the existing one.
    /// Returns the (possibly synthesized) id.
    pub fn insert(&self, value: Value) -> Result<String> {
        let mut state = self.state.write();
        insert_locked(&mut state, value)
    }

    /// Insert a batch under one lock acquisition.
    pub fn insert_many(&self, values: Vec<Value>) -> Result<Vec<String>> {
        let mut state = self.state.write();
        values
            .into_iter()
            .map(|value| insert_locked(&mut state, value))
            .collect()
    }

    /// Shallow-merge `patch` into every document matching `filter`.
    /// `_id` is immutable; a patched `_id` field is ignored.
    pub fn update(&self, filter: &Value, patch: &Value) -> Result<usize> {
        let Some(patch_fields) = patch.as_object() else {
            return Err(StoreError::InvalidQuery(
                "update patch must be an object".to_string(),
            ));
        };

        let mut state = self.state.write();
        let matched = matched_ids(&state, filter);

        let CollectionState { docs, indexes, .. } = &mut *state;
        for id in &matched {
            let Some(doc) = docs.get_mut(id) else {
                continue;
            };
            for (field, new_value) in patch_fields {
                if field == "_id" {
                    continue;
                }
                if let Some(index) = indexes.get_mut(field) {
                    if let Some(old_value) = doc.get(field) {
                        index.remove_entry(&old_value.clone(), id);
                    }
                    index.insert_entry(new_value, id);
                }
                doc.set(field.clone(), new_value.clone());
            }
        }

        log_debug!("updated {} documents in '{}'", matched.len(), self.name);
        Ok(matched.len())
    }

    /// Delete every document matching `filter`.
    pub fn delete(&self, filter: &Value) -> Result<usize> {
        let mut state = self.state.write();
        let matched = matched_ids(&state, filter);
        if matched.is_empty() {
            return Ok(0);
        }

        let CollectionState {
            docs,
            order,
            indexes,
        } = &mut *state;
        for id in &matched {
            if let Some(doc) = docs.remove(id) {
                for index in indexes.values_mut() {
                    if let Some(value) = doc.get(index.field()) {
                        index.remove_entry(&value.clone(), id);
                    }
                }
            }
        }
        let removed: std::collections::HashSet<&str> =
            matched.iter().map(String::as_str).collect();
        order.retain(|id| !removed.contains(id.as_str()));

        log_debug!("deleted {} documents from '{}'", matched.len(), self.name);
        Ok(matched.len())
    }

    /// Run the planner and evaluator, then sort / skip / limit / project.
    pub fn find(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        if let Some(projection) = &options.projection {
            validate_projection(projection)?;
        }

        let state = self.state.read();
        let mut results: Vec<Value> = matched_ids(&state, filter)
            .iter()
            .filter_map(|id| state.docs.get(id))
            .map(Document::to_value)
            .collect();
        drop(state);

        if let Some(sort) = &options.sort {
            apply_sort(&mut results, sort);
        }
        if let Some(skip) = options.skip {
            results = results.into_iter().skip(skip).collect();
        }
        if let Some(limit) = options.limit {
            results.truncate(limit);
        }
        if let Some(projection) = &options.projection {
            results = results
                .iter()
                .map(|doc| apply_projection(doc, projection))
                .collect();
        }
        Ok(results)
    }

    /// Matching document count, no materialization.
    pub fn count(&self, filter: &Value) -> Result<usize> {
        let state = self.state.read();
        Ok(matched_ids(&state, filter).len())
    }

    /// Fetch one document by id.
    pub fn get(&self, id: &str) -> Option<Value> {
        self.state.read().docs.get(id).map(Document::to_value)
    }

    /// Build a secondary index over `field` by scanning all documents.
    /// Idempotent: a second build on the same field is a no-op.
    pub fn create_index(&self, field: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.indexes.contains_key(field) {
            return Ok(());
        }
        let CollectionState {
            docs,
            order,
            indexes,
        } = &mut *state;
        let index = Index::build(field, order.iter().filter_map(|id| docs.get(id)));
        indexes.insert(field.to_string(), index);
        log_info!("created index on '{}.{}'", self.name, field);
        Ok(())
    }

    pub fn index_fields(&self) -> Vec<String> {
        self.state.read().indexes.keys().cloned().collect()
    }

    /// Atomically rewrite `documents.json` (write temp, rename).
    pub fn save(&self) -> Result<()> {
        let state = self.state.read();
        let docs: Vec<Value> = state
            .order
            .iter()
            .filter_map(|id| state.docs.get(id))
            .map(Document::to_value)
            .collect();
        drop(state);

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(DOCUMENTS_FILE);
        let tmp = self.dir.join(format!("{}.tmp", DOCUMENTS_FILE));
        let rendered = serde_json::to_vec_pretty(&docs)?;
        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, &path)?;

        log_debug!("saved {} documents for '{}'", docs.len(), self.name);
        Ok(())
    }

    /// Persist every index file.
    pub fn save_indexes(&self) -> Result<()> {
        let state = self.state.read();
        let index_dir = self.dir.join(INDEX_DIR);
        for (field, index) in &state.indexes {
            index.save(&index_dir.join(format!("{}.{}", field, INDEX_EXT)))?;
        }
        Ok(())
    }

    /// The backing directory (used by the manager when dropping).
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn insert_locked(state: &mut CollectionState, value: Value) -> Result<String> {
    let doc = Document::from_value(value).map_err(StoreError::Serialization)?;

    let size = serde_json::to_vec(&doc)?.len();
    if size > MAX_DOCUMENT_BYTES {
        return Err(StoreError::DocumentTooLarge {
            size,
            limit: MAX_DOCUMENT_BYTES,
        });
    }

    let id = doc.id.clone();
    let CollectionState {
        docs,
        order,
        indexes,
    } = state;

    if let Some(previous) = docs.put(id.clone(), doc) {
        // Replacement: retract the old document's index entries first.
        for index in indexes.values_mut() {
            if let Some(value) = previous.get(index.field()) {
                index.remove_entry(&value.clone(), &id);
            }
        }
    } else {
        order.push(id.clone());
    }

    let doc = docs.get(&id).expect("document was just inserted");
    for index in indexes.values_mut() {
        index.insert_entry_for(doc);
    }
    Ok(id)
}

fn matched_ids(state: &CollectionState, filter: &Value) -> Vec<String> {
    let matches = |id: &str| {
        state
            .docs
            .get(id)
            .map(|doc| matches_document(doc, filter))
            .unwrap_or(false)
    };
    match plan(filter, &state.indexes) {
        Candidates::Ids(ids) => ids.into_iter().filter(|id| matches(id.as_str())).collect(),
        Candidates::FullScan => state
            .order
            .iter()
            .filter(|id| matches(id.as_str()))
            .cloned()
            .collect(),
    }
}

fn load_documents(dir: &Path) -> Result<(HashTable<Document>, Vec<String>)> {
    let mut docs = HashTable::new();
    let mut order = Vec::new();

    let path = dir.join(DOCUMENTS_FILE);
    if !path.exists() {
        return Ok((docs, order));
    }

    let raw = fs::read(&path)?;
    let values: Vec<Value> = serde_json::from_slice(&raw)
        .map_err(|e| StoreError::Corruption(format!("{}: {}", path.display(), e)))?;

    for value in values {
        match Document::from_value(value) {
            Ok(doc) => {
                let id = doc.id.clone();
                if docs.put(id.clone(), doc).is_none() {
                    order.push(id);
                }
            }
            Err(e) => log_warn!("skipping unreadable document in {}: {}", path.display(), e),
        }
    }
    Ok((docs, order))
}
