// src/query/planner.rs
//! Candidate selection: decide between index lookups and a full scan.
//!
//! The planner only narrows the candidate set; the evaluator re-checks
//! every candidate against the full query, so a plan is never allowed to
//! miss a matching document - falling back to `FullScan` is always safe.

use crate::index::btree::IndexKey;
use crate::index::Index;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

/// The planner's verdict for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidates {
    /// Evaluate only these document ids.
    Ids(Vec<String>),
    /// Walk the collection's insertion-order log.
    FullScan,
}

/// Plan a query against the available indexes.
pub fn plan(filter: &Value, indexes: &BTreeMap<String, Index>) -> Candidates {
    let Some(conditions) = filter.as_object() else {
        return Candidates::FullScan;
    };
    if conditions.is_empty() {
        return Candidates::FullScan;
    }

    // Top-level $or: usable only when every branch is indexable.
    if conditions.len() == 1 {
        if let Some(branches) = conditions.get("$or").and_then(Value::as_array) {
            let mut union = Vec::new();
            let mut seen = HashSet::new();
            for branch in branches {
                match plan(branch, indexes) {
                    Candidates::Ids(ids) => {
                        for id in ids {
                            if seen.insert(id.clone()) {
                                union.push(id);
                            }
                        }
                    }
                    Candidates::FullScan => return Candidates::FullScan,
                }
            }
            return Candidates::Ids(union);
        }
        if let Some(branches) = conditions.get("$and").and_then(Value::as_array) {
            return intersect_plans(branches.iter().map(|b| plan(b, indexes)));
        }
    }

    // Implicit conjunction over top-level clauses: intersect whatever the
    // indexable ones yield.
    intersect_plans(
        conditions
            .iter()
            .map(|(field, condition)| plan_clause(field, condition, indexes)),
    )
}

fn intersect_plans(plans: impl Iterator<Item = Candidates>) -> Candidates {
    let mut result: Option<Vec<String>> = None;
    for plan in plans {
        if let Candidates::Ids(ids) = plan {
            result = Some(match result {
                None => ids,
                Some(existing) => {
                    let keep: HashSet<&str> = ids.iter().map(String::as_str).collect();
                    existing
                        .into_iter()
                        .filter(|id| keep.contains(id.as_str()))
                        .collect()
                }
            });
        }
    }
    match result {
        Some(ids) => Candidates::Ids(ids),
        None => Candidates::FullScan,
    }
}

/// Plan a single `field: condition` clause.
fn plan_clause(field: &str, condition: &Value, indexes: &BTreeMap<String, Index>) -> Candidates {
    if field.starts_with('$') {
        // Logical operator in implicit-and position: only $and/$or nest
        // usefully; anything else scans.
        return match field {
            "$and" => match condition.as_array() {
                Some(branches) => intersect_plans(branches.iter().map(|b| plan(b, indexes))),
                None => Candidates::FullScan,
            },
            _ => Candidates::FullScan,
        };
    }

    let Some(index) = indexes.get(field) else {
        return Candidates::FullScan;
    };

    match condition.as_object() {
        Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            // {$eq: v} alone -> exact lookup
            if ops.len() == 1 {
                if let Some(value) = ops.get("$eq") {
                    return match IndexKey::from_value(value) {
                        Some(_) => Candidates::Ids(index.search(value)),
                        None => Candidates::FullScan,
                    };
                }
            }
            // Pure range clause -> leaf-chain scan
            if ops.keys().all(|k| matches!(k.as_str(), "$gt" | "$gte" | "$lt" | "$lte")) {
                return plan_range(index, ops);
            }
            Candidates::FullScan
        }
        // Bare literal equality
        _ => match IndexKey::from_value(condition) {
            Some(_) => Candidates::Ids(index.search(condition)),
            None => Candidates::FullScan,
        },
    }
}

fn plan_range(index: &Index, ops: &serde_json::Map<String, Value>) -> Candidates {
    let mut lo: Bound<IndexKey> = Bound::Unbounded;
    let mut hi: Bound<IndexKey> = Bound::Unbounded;

    for (name, operand) in ops {
        let Some(key) = IndexKey::from_value(operand) else {
            return Candidates::FullScan;
        };
        match name.as_str() {
            "$gt" => lo = Bound::Excluded(key),
            "$gte" => lo = Bound::Included(key),
            "$lt" => hi = Bound::Excluded(key),
            "$lte" => hi = Bound::Included(key),
            _ => return Candidates::FullScan,
        }
    }

    Candidates::Ids(index.range(as_ref_bound(&lo), as_ref_bound(&hi)))
}

fn as_ref_bound(bound: &Bound<IndexKey>) -> Bound<&IndexKey> {
    match bound {
        Bound::Unbounded => Bound::Unbounded,
        Bound::Included(k) => Bound::Included(k),
        Bound::Excluded(k) => Bound::Excluded(k),
    }
}
