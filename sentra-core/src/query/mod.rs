// src/query/mod.rs
//! JSON-expressed query language: evaluation and planning.
//!
//! A query is a JSON object whose keys are either field names (with a
//! literal or an operator document as value) or a logical operator:
//!
//! ```json
//! {"severity": "high"}
//! {"n": {"$gte": 40, "$lt": 45}}
//! {"$or": [{"source": "auditd"}, {"severity": {"$in": ["high", "critical"]}}]}
//! ```
//!
//! The empty query `{}` matches every document. Malformed conditions match
//! nothing; they never error.

pub mod operators;
pub mod planner;

use crate::document::Document;
use serde_json::Value;

pub use operators::{numeric_eq_coercion, set_numeric_eq_coercion};
pub use planner::{plan, Candidates};

/// Evaluate the full query against one document.
pub fn matches_document(doc: &Document, filter: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        // Only objects are queries; anything else matches nothing.
        return false;
    };

    for (key, operand) in conditions {
        let matched = match key.as_str() {
            "$and" => operand
                .as_array()
                .map(|subs| subs.iter().all(|sub| matches_document(doc, sub)))
                .unwrap_or(false),
            "$or" => operand
                .as_array()
                .map(|subs| subs.iter().any(|sub| matches_document(doc, sub)))
                .unwrap_or(false),
            // a non-object operand is malformed, not a match-all
            "$not" => operand.is_object() && !matches_document(doc, operand),
            field => matches_field(doc, field, operand),
        };
        if !matched {
            return false;
        }
    }
    true
}

fn matches_field(doc: &Document, field: &str, condition: &Value) -> bool {
    // `_id` lives outside the field map; materialize it for matching.
    let id_value;
    let doc_value = if field == "_id" {
        id_value = doc.id_value();
        Some(&id_value)
    } else {
        doc.get(field)
    };

    match condition.as_object() {
        Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            ops.iter().all(|(name, operand)| {
                operators::operator(name)
                    .map(|op| op.matches(doc_value, operand))
                    .unwrap_or(false)
            })
        }
        // Bare literal condition: implicit $eq. Plain objects compare deeply.
        _ => operators::operator("$eq")
            .expect("$eq is registered")
            .matches(doc_value, condition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_query_matches_all() {
        let d = doc(json!({"_id": "1", "user": "root"}));
        assert!(matches_document(&d, &json!({})));
    }

    #[test]
    fn test_simple_equality() {
        let d = doc(json!({"_id": "1", "user": "root"}));
        assert!(matches_document(&d, &json!({"user": "root"})));
        assert!(!matches_document(&d, &json!({"user": "admin"})));
        assert!(!matches_document(&d, &json!({"missing": "x"})));
    }

    #[test]
    fn test_id_matching() {
        let d = doc(json!({"_id": "ev-9", "user": "root"}));
        assert!(matches_document(&d, &json!({"_id": "ev-9"})));
        assert!(!matches_document(&d, &json!({"_id": "ev-8"})));
        assert!(matches_document(&d, &json!({"_id": {"$in": ["ev-9", "ev-10"]}})));
    }

    #[test]
    fn test_comparison_operators() {
        let d = doc(json!({"_id": "1", "n": 25}));
        assert!(matches_document(&d, &json!({"n": {"$gte": 18, "$lt": 30}})));
        assert!(!matches_document(&d, &json!({"n": {"$gte": 18, "$lt": 20}})));
        assert!(!matches_document(&d, &json!({"n": {"$gt": 30}})));
    }

    #[test]
    fn test_logical_and() {
        let q = json!({"$and": [{"n": {"$gte": 18}}, {"city": "NYC"}]});
        assert!(matches_document(&doc(json!({"_id": "1", "n": 25, "city": "NYC"})), &q));
        assert!(!matches_document(&doc(json!({"_id": "2", "n": 15, "city": "NYC"})), &q));
        assert!(!matches_document(&doc(json!({"_id": "3", "n": 25, "city": "LA"})), &q));
    }

    #[test]
    fn test_logical_or() {
        let q = json!({"$or": [{"n": {"$lt": 18}}, {"n": {"$gt": 65}}]});
        assert!(matches_document(&doc(json!({"_id": "1", "n": 15})), &q));
        assert!(matches_document(&doc(json!({"_id": "2", "n": 70})), &q));
        assert!(!matches_document(&doc(json!({"_id": "3", "n": 30})), &q));
    }

    #[test]
    fn test_logical_not() {
        let q = json!({"$not": {"severity": "low"}});
        assert!(matches_document(&doc(json!({"_id": "1", "severity": "high"})), &q));
        assert!(!matches_document(&doc(json!({"_id": "2", "severity": "low"})), &q));
    }

    #[test]
    fn test_nested_logical() {
        let q = json!({
            "$and": [
                {"$or": [{"city": "NYC"}, {"city": "LA"}]},
                {"n": {"$gte": 25}},
                {"active": true}
            ]
        });
        assert!(matches_document(
            &doc(json!({"_id": "1", "city": "NYC", "n": 30, "active": true})),
            &q
        ));
        assert!(!matches_document(
            &doc(json!({"_id": "2", "city": "LA", "n": 20, "active": true})),
            &q
        ));
        assert!(!matches_document(
            &doc(json!({"_id": "3", "city": "Chicago", "n": 30, "active": true})),
            &q
        ));
    }

    #[test]
    fn test_exists() {
        let with = doc(json!({"_id": "1", "user": null}));
        let without = doc(json!({"_id": "2"}));
        let q_yes = json!({"user": {"$exists": true}});
        let q_no = json!({"user": {"$exists": false}});
        assert!(matches_document(&with, &q_yes));
        assert!(!matches_document(&without, &q_yes));
        assert!(!matches_document(&with, &q_no));
        assert!(matches_document(&without, &q_no));
    }

    #[test]
    fn test_malformed_conditions_match_nothing() {
        let d = doc(json!({"_id": "1", "n": 5}));
        // unknown operator
        assert!(!matches_document(&d, &json!({"n": {"$near": 5}})));
        // $and over a non-array
        assert!(!matches_document(&d, &json!({"$and": {"n": 5}})));
        // $not over a non-object
        assert!(!matches_document(&d, &json!({"$not": [1, 2]})));
        // non-object query
        assert!(!matches_document(&d, &json!("n = 5")));
    }

    #[test]
    fn test_literal_object_condition_is_deep_eq() {
        let d = doc(json!({"_id": "1", "geo": {"cc": "DE", "asn": 3320}}));
        assert!(matches_document(&d, &json!({"geo": {"cc": "DE", "asn": 3320}})));
        assert!(!matches_document(&d, &json!({"geo": {"cc": "DE"}})));
    }
}
