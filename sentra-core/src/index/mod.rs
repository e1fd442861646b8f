// src/index/mod.rs
//! Secondary indexes: a named field mapped through a B+ tree.

pub mod btree;

use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::{log_debug, log_warn};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Bound;
use std::path::Path;

use btree::{BPlusTree, IndexKey, DEFAULT_ORDER};

const INDEX_MAGIC: &[u8; 4] = b"SIDX";
const INDEX_VERSION: u8 = 1;

/// A secondary index over one document field.
///
/// The index holds no reference back to its collection; builds receive a
/// read-only document iterator instead.
#[derive(Debug, Clone)]
pub struct Index {
    field: String,
    tree: BPlusTree,
}

impl Index {
    pub fn new(field: impl Into<String>) -> Self {
        Index {
            field: field.into(),
            tree: BPlusTree::new(DEFAULT_ORDER),
        }
    }

    /// Build by scanning documents. Documents without the field (or with a
    /// null/array/object value) contribute nothing.
    pub fn build<'a>(
        field: impl Into<String>,
        docs: impl Iterator<Item = &'a Document>,
    ) -> Self {
        let mut index = Index::new(field);
        for doc in docs {
            index.insert_entry_for(doc);
        }
        index
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    /// Record `doc` under its value of the indexed field, if indexable.
    pub fn insert_entry_for(&mut self, doc: &Document) {
        if let Some(key) = doc.get(&self.field).and_then(IndexKey::from_value) {
            self.tree.insert(key, doc.id.clone());
        }
    }

    pub fn insert_entry(&mut self, value: &Value, id: &str) {
        if let Some(key) = IndexKey::from_value(value) {
            self.tree.insert(key, id.to_string());
        }
    }

    /// Drop the `(value, id)` entry, if present.
    pub fn remove_entry(&mut self, value: &Value, id: &str) {
        if let Some(key) = IndexKey::from_value(value) {
            self.tree.remove_id(&key, id);
        }
    }

    /// Ids holding `value`, de-duplicated, insertion order preserved.
    pub fn search(&self, value: &Value) -> Vec<String> {
        match IndexKey::from_value(value) {
            Some(key) => dedup_ids(self.tree.search(&key).iter()),
            None => Vec::new(),
        }
    }

    /// Ids whose key falls in the bounds, ascending key order.
    pub fn range(&self, lo: Bound<&IndexKey>, hi: Bound<&IndexKey>) -> Vec<String> {
        dedup_ids(self.tree.range(lo, hi).flat_map(|(_, ids)| ids.iter()))
    }

    /// Persist as a length-prefixed sequence of `(key, ids)` records behind
    /// a magic header. Written to a temp file and renamed into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("idx.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);

            writer.write_all(INDEX_MAGIC)?;
            writer.write_all(&[INDEX_VERSION])?;

            let field_bytes = self.field.as_bytes();
            writer.write_all(&(field_bytes.len() as u32).to_be_bytes())?;
            writer.write_all(field_bytes)?;
            writer.write_all(&(self.tree.key_count()).to_be_bytes())?;

            for (key, ids) in self.tree.entries() {
                let record = bincode::serialize(&(key, ids))
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                writer.write_all(&(record.len() as u32).to_be_bytes())?;
                writer.write_all(&record)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        log_debug!("saved index '{}' to {}", self.field, path.display());
        Ok(())
    }

    /// Load a persisted index. Records are pre-sorted, so reinserting them
    /// in file order reproduces the tree.
    pub fn load(path: &Path) -> Result<Index> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != INDEX_MAGIC {
            return Err(StoreError::Corruption(format!(
                "bad index magic in {}",
                path.display()
            )));
        }
        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != INDEX_VERSION {
            return Err(StoreError::Corruption(format!(
                "unsupported index version {} in {}",
                version[0],
                path.display()
            )));
        }

        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let field_len = u32::from_be_bytes(len_buf) as usize;
        let mut field_bytes = vec![0u8; field_len];
        reader.read_exact(&mut field_bytes)?;
        let field = String::from_utf8(field_bytes)
            .map_err(|_| StoreError::Corruption("index field name is not UTF-8".to_string()))?;

        let mut count_buf = [0u8; 8];
        reader.read_exact(&mut count_buf)?;
        let count = u64::from_be_bytes(count_buf);

        let mut index = Index::new(field);
        for _ in 0..count {
            reader.read_exact(&mut len_buf)?;
            let record_len = u32::from_be_bytes(len_buf) as usize;
            let mut record = vec![0u8; record_len];
            reader.read_exact(&mut record)?;
            let (key, ids): (IndexKey, Vec<String>) = bincode::deserialize(&record)
                .map_err(|e| StoreError::Corruption(format!("index record: {}", e)))?;
            for id in ids {
                index.tree.insert(key.clone(), id);
            }
        }
        log_debug!(
            "loaded index '{}' ({} keys) from {}",
            index.field,
            index.tree.key_count(),
            path.display()
        );
        Ok(index)
    }

    /// Load `path`, falling back to a fresh build from `docs` when the file
    /// is missing or unreadable.
    pub fn load_or_build<'a>(
        field: &str,
        path: &Path,
        docs: impl Iterator<Item = &'a Document>,
    ) -> Index {
        match Index::load(path) {
            Ok(index) if index.field == field => index,
            Ok(index) => {
                log_warn!(
                    "index file {} names field '{}', expected '{}'; rebuilding",
                    path.display(),
                    index.field,
                    field
                );
                Index::build(field, docs)
            }
            Err(e) => {
                log_warn!("failed to load index {}: {}; rebuilding", path.display(), e);
                Index::build(field, docs)
            }
        }
    }
}

fn dedup_ids<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if seen.insert(id.as_str()) {
            out.push(id.clone());
        }
    }
    out
}
