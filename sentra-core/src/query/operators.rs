// src/query/operators.rs
//! Query operator implementations.
//!
//! Each operator is a separate type behind the [`OperatorMatcher`] trait.
//! All operators are total predicates: a type mismatch yields `false`,
//! never an error, so a malformed condition silently matches nothing.

use crate::value_utils::{to_f64, values_equal};
use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Mutex;

// ============================================================================
// NUMERIC EQUALITY MODE
// ============================================================================

// `$eq` distinguishes 42 from 42.0 by default. Deployments that want
// Mongo-style numeric equality flip this process-wide switch.
static NUMERIC_EQ_COERCION: AtomicBool = AtomicBool::new(false);

pub fn set_numeric_eq_coercion(enabled: bool) {
    NUMERIC_EQ_COERCION.store(enabled, AtomicOrdering::Relaxed);
}

pub fn numeric_eq_coercion() -> bool {
    NUMERIC_EQ_COERCION.load(AtomicOrdering::Relaxed)
}

// ============================================================================
// LIKE PATTERN CACHE
// ============================================================================

lazy_static! {
    /// Compiled `$like` patterns. Bounded so hostile query streams cannot
    /// grow the cache without limit.
    static ref LIKE_CACHE: Mutex<LruCache<String, Regex>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(128).unwrap()));
}

/// Translate a SQL-style pattern into an anchored regex:
/// `%` matches any run of characters, `_` any single character.
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

fn like_match(text: &str, pattern: &str) -> bool {
    {
        let mut cache = LIKE_CACHE.lock().unwrap();
        if let Some(regex) = cache.get(pattern) {
            return regex.is_match(text);
        }
    }

    // Everything except the wildcards is escaped, so compilation cannot fail
    // on user input; treat a failure as a non-match anyway.
    let Ok(regex) = Regex::new(&like_to_regex(pattern)) else {
        return false;
    };
    let matched = regex.is_match(text);
    LIKE_CACHE
        .lock()
        .unwrap()
        .put(pattern.to_string(), regex);
    matched
}

// ============================================================================
// TRAIT DEFINITION
// ============================================================================

/// A comparison operator applied to one document field.
///
/// `doc_value` is `None` when the field is absent from the document;
/// `operand` is the right-hand side from the query.
pub trait OperatorMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool;
}

// ============================================================================
// COMPARISON OPERATORS
// ============================================================================

/// `$eq`: deep equality - same kind, same value; arrays element-wise in
/// order, objects field-wise. Also the semantics of a bare literal
/// condition (`{"severity": "high"}`).
pub struct EqOperator;

impl OperatorMatcher for EqOperator {
    fn name(&self) -> &'static str {
        "$eq"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        match doc_value {
            None => false,
            Some(v) => values_equal(v, operand, numeric_eq_coercion()),
        }
    }
}

fn compare_numeric(
    doc_value: Option<&Value>,
    operand: &Value,
    accept: fn(Ordering) -> bool,
) -> bool {
    let (Some(doc_value), Some(rhs)) = (doc_value, to_f64(operand)) else {
        return false;
    };
    let Some(lhs) = to_f64(doc_value) else {
        return false;
    };
    lhs.partial_cmp(&rhs).map(accept).unwrap_or(false)
}

/// `$gt`: numeric greater-than after f64 coercion of both sides.
/// Non-coercible operands (strings, booleans, ...) never match.
pub struct GtOperator;

impl OperatorMatcher for GtOperator {
    fn name(&self) -> &'static str {
        "$gt"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        compare_numeric(doc_value, operand, |ord| ord == Ordering::Greater)
    }
}

/// `$gte`
pub struct GteOperator;

impl OperatorMatcher for GteOperator {
    fn name(&self) -> &'static str {
        "$gte"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        compare_numeric(doc_value, operand, |ord| {
            matches!(ord, Ordering::Greater | Ordering::Equal)
        })
    }
}

/// `$lt`
pub struct LtOperator;

impl OperatorMatcher for LtOperator {
    fn name(&self) -> &'static str {
        "$lt"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        compare_numeric(doc_value, operand, |ord| ord == Ordering::Less)
    }
}

/// `$lte`
pub struct LteOperator;

impl OperatorMatcher for LteOperator {
    fn name(&self) -> &'static str {
        "$lte"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        compare_numeric(doc_value, operand, |ord| {
            matches!(ord, Ordering::Less | Ordering::Equal)
        })
    }
}

// ============================================================================
// MEMBERSHIP AND PATTERN OPERATORS
// ============================================================================

/// `$in`: the field value is a member of the operand array.
/// A non-array operand matches nothing.
pub struct InOperator;

impl OperatorMatcher for InOperator {
    fn name(&self) -> &'static str {
        "$in"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        let (Some(v), Some(candidates)) = (doc_value, operand.as_array()) else {
            return false;
        };
        let coerce = numeric_eq_coercion();
        candidates.iter().any(|c| values_equal(v, c, coerce))
    }
}

/// `$nin`: negation of `$in`; an absent field is trivially "not in".
pub struct NinOperator;

impl OperatorMatcher for NinOperator {
    fn name(&self) -> &'static str {
        "$nin"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        !InOperator.matches(doc_value, operand)
    }
}

/// `$like`: SQL-style pattern, anchored at both ends.
/// Both sides must be strings.
pub struct LikeOperator;

impl OperatorMatcher for LikeOperator {
    fn name(&self) -> &'static str {
        "$like"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        match (doc_value.and_then(Value::as_str), operand.as_str()) {
            (Some(text), Some(pattern)) => like_match(text, pattern),
            _ => false,
        }
    }
}

/// `$exists`: field presence. A field holding `null` is still present.
pub struct ExistsOperator;

impl OperatorMatcher for ExistsOperator {
    fn name(&self) -> &'static str {
        "$exists"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        match operand.as_bool() {
            Some(expected) => doc_value.is_some() == expected,
            None => false,
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

static EQ: EqOperator = EqOperator;
static GT: GtOperator = GtOperator;
static GTE: GteOperator = GteOperator;
static LT: LtOperator = LtOperator;
static LTE: LteOperator = LteOperator;
static IN: InOperator = InOperator;
static NIN: NinOperator = NinOperator;
static LIKE: LikeOperator = LikeOperator;
static EXISTS: ExistsOperator = ExistsOperator;

/// Look up a field-level operator by name. Logical operators (`$and`,
/// `$or`, `$not`) recurse over whole sub-queries and are handled by the
/// evaluator, not here.
pub fn operator(name: &str) -> Option<&'static dyn OperatorMatcher> {
    match name {
        "$eq" => Some(&EQ),
        "$gt" => Some(&GT),
        "$gte" => Some(&GTE),
        "$lt" => Some(&LT),
        "$lte" => Some(&LTE),
        "$in" => Some(&IN),
        "$nin" => Some(&NIN),
        "$like" => Some(&LIKE),
        "$exists" => Some(&EXISTS),
        _ => None,
    }
}
