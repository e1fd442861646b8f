// sentra-core/src/lib.rs
// Embedded schemaless document store: collections of self-describing JSON
// documents, B+ tree secondary indexes, and a JSON-expressed query language.

#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![cfg_attr(test, allow(dead_code))]

pub mod collection;
pub mod document;
pub mod error;
pub mod find_options;
pub mod index;
pub mod logging;
pub mod manager;
pub mod query;
pub mod storage;
pub mod value_utils;

// Public exports
pub use collection::{Collection, MAX_DOCUMENT_BYTES};
pub use document::Document;
pub use error::{Result, StoreError};
pub use find_options::FindOptions;
pub use index::btree::{BPlusTree, IndexKey, OrderedF64};
pub use index::Index;
pub use logging::{init_from_env, log_level, set_log_level, LogLevel};
pub use manager::CollectionManager;
pub use query::{matches_document, numeric_eq_coercion, set_numeric_eq_coercion};
pub use storage::HashTable;
