//! In-memory document store
//!
//! Evaluates typed pipelines over JSON documents held in memory, following
//! the store's semantics: comparisons only match values of the same type,
//! a missing field reads as null, and sorting uses one total order across
//! types (null < numbers < text < objects < lists < booleans).

use super::store::DocumentStore;
use crate::ast::{CompareOp, Expr, Pipeline, SortKey, Stage, ValueExpr};
use crate::builder::json_kind;
use crate::error::{ConnectionError, ConnectionResult};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// What a missing field reads as
static NULL: Value = Value::Null;

/// Collections of JSON documents behind an async lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &str, doc: Value) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    pub async fn insert_many(&self, collection: &str, docs: impl IntoIterator<Item = Value>) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
    }

    /// Remove documents whose `field` equals `value`; returns how many went
    pub async fn remove(&self, collection: &str, field: &str, value: &Value) -> usize {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return 0;
        };
        let before = docs.len();
        docs.retain(|doc| doc.get(field) != Some(value));
        before - docs.len()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn aggregate(&self, pipeline: &Pipeline) -> ConnectionResult<Vec<Value>> {
        let docs = self
            .collections
            .read()
            .await
            .get(&pipeline.collection)
            .cloned()
            .unwrap_or_default();
        run_pipeline(&pipeline.stages, docs)
    }
}

/// Run stages over a document stream
pub fn run_pipeline(stages: &[Stage], mut docs: Vec<Value>) -> ConnectionResult<Vec<Value>> {
    for stage in stages {
        docs = run_stage(stage, docs)?;
    }
    Ok(docs)
}

fn run_stage(stage: &Stage, docs: Vec<Value>) -> ConnectionResult<Vec<Value>> {
    match stage {
        Stage::Match(expr) => {
            let mut kept = Vec::with_capacity(docs.len());
            for doc in docs {
                if matches(expr, &doc)? {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        Stage::AddFields(fields) => docs
            .into_iter()
            .map(|doc| -> ConnectionResult<Value> {
                // every entry sees the incoming document
                let mut computed = Vec::with_capacity(fields.len());
                for (key, expr) in fields {
                    computed.push((key.clone(), evaluate(expr, &doc)?));
                }
                let mut doc = doc;
                if let Some(object) = doc.as_object_mut() {
                    object.extend(computed);
                }
                Ok(doc)
            })
            .collect(),
        Stage::Sort(keys) => Ok(sort(docs, keys)),
        Stage::Limit(n) => Ok(docs
            .into_iter()
            .take(usize::try_from(*n).unwrap_or(usize::MAX))
            .collect()),
        Stage::Count(field) => {
            if docs.is_empty() {
                return Ok(vec![]);
            }
            let mut row = Map::new();
            row.insert(field.clone(), Value::from(docs.len() as u64));
            Ok(vec![Value::Object(row)])
        }
    }
}

fn sort(mut docs: Vec<Value>, keys: &[SortKey]) -> Vec<Value> {
    // stable, so fully tied documents keep insertion order
    docs.sort_by(|a, b| {
        for key in keys {
            let va = key.path.lookup(a).unwrap_or(&NULL);
            let vb = key.path.lookup(b).unwrap_or(&NULL);
            let cmp = compare_values(va, vb);
            if cmp != Ordering::Equal {
                return if key.direction.is_asc() {
                    cmp
                } else {
                    cmp.reverse()
                };
            }
        }
        Ordering::Equal
    });
    docs
}

/// Evaluate a match predicate against one document
pub fn matches(expr: &Expr, doc: &Value) -> ConnectionResult<bool> {
    Ok(match expr {
        Expr::Literal(b) => *b,
        Expr::Compare { path, op, value } => {
            let field = path.lookup(doc).unwrap_or(&NULL);
            compare_matches(field, *op, value)
        }
        Expr::In {
            path,
            values,
            negated,
        } => {
            let field = path.lookup(doc).unwrap_or(&NULL);
            values.iter().any(|v| values_equal(field, v)) != *negated
        }
        Expr::Regex {
            path,
            pattern,
            case_insensitive,
        } => match path.lookup(doc) {
            Some(Value::String(text)) => RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(|e| ConnectionError::execution(format!("bad pattern {pattern}: {e}")))?
                .is_match(text),
            _ => false,
        },
        Expr::IsNull { path, negated } => {
            let is_null = path.lookup(doc).map_or(true, Value::is_null);
            is_null != *negated
        }
        Expr::ContainsAll { path, values } => match path.lookup(doc) {
            Some(Value::Array(items)) => values
                .iter()
                .all(|v| items.iter().any(|item| values_equal(item, v))),
            _ => false,
        },
        Expr::And(elems) => {
            for elem in elems {
                if !matches(elem, doc)? {
                    return Ok(false);
                }
            }
            true
        }
        Expr::Or(elems) => {
            for elem in elems {
                if matches(elem, doc)? {
                    return Ok(true);
                }
            }
            false
        }
        Expr::Not(inner) => !matches(inner, doc)?,
    })
}

fn compare_matches(field: &Value, op: CompareOp, literal: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(field, literal),
        CompareOp::Ne => !values_equal(field, literal),
        _ => {
            // range operators only compare within a type bracket
            if type_rank(field) != type_rank(literal) || field.is_null() {
                return false;
            }
            let cmp = compare_values(field, literal);
            match op {
                CompareOp::Lt => cmp == Ordering::Less,
                CompareOp::Lte => cmp != Ordering::Greater,
                CompareOp::Gt => cmp == Ordering::Greater,
                _ => cmp != Ordering::Less,
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order used by `$sort`
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xi, yi) in x.iter().zip(y) {
                let cmp = compare_values(xi, yi);
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((kx, vx), (ky, vy)) in x.iter().zip(y) {
                let cmp = kx.cmp(ky).then_with(|| compare_values(vx, vy));
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    let a = x.as_f64().unwrap_or(f64::NAN);
    let b = y.as_f64().unwrap_or(f64::NAN);
    a.total_cmp(&b)
}

/// Evaluate a computed value against one document
pub fn evaluate(expr: &ValueExpr, doc: &Value) -> ConnectionResult<Value> {
    match expr {
        ValueExpr::Field(path) => Ok(path.lookup(doc).cloned().unwrap_or(Value::Null)),
        ValueExpr::Literal(value) => Ok(value.clone()),
        ValueExpr::Substr { input, start, len } => {
            let text = match evaluate(input, doc)? {
                Value::Null => String::new(),
                Value::String(s) => s,
                other => return Err(operand_error("$substrBytes", &other)),
            };
            let start = (*start).min(text.len());
            let end = start.saturating_add(*len).min(text.len());
            text.get(start..end)
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| {
                    ConnectionError::execution("$substrBytes: range splits a utf-8 character")
                })
        }
        ValueExpr::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                match evaluate(part, doc)? {
                    Value::Null => {}
                    Value::String(s) => out.push_str(&s),
                    other => return Err(operand_error("$concat", &other)),
                }
            }
            Ok(Value::String(out))
        }
        ValueExpr::Size(input) => match evaluate(input, doc)? {
            Value::Null => Ok(Value::from(0u64)),
            Value::Array(items) => Ok(Value::from(items.len() as u64)),
            other => Err(operand_error("$size", &other)),
        },
        ValueExpr::Add(parts) => {
            // stays integral until a float operand shows up
            let mut int_sum: Option<i64> = Some(0);
            let mut float_sum = 0.0f64;
            for part in parts {
                let value = evaluate(part, doc)?;
                let number = match &value {
                    Value::Null => continue,
                    Value::Number(n) => n,
                    other => return Err(operand_error("$add", other)),
                };
                if let Some(acc) = int_sum {
                    if number.is_f64() {
                        int_sum = None;
                    } else {
                        let sum = number.as_i64().and_then(|n| acc.checked_add(n));
                        int_sum = Some(sum.ok_or_else(|| {
                            ConnectionError::execution("$add: integer overflow")
                        })?);
                    }
                }
                float_sum += number.as_f64().unwrap_or(0.0);
            }
            Ok(match int_sum {
                Some(n) => Value::from(n),
                None => Number::from_f64(float_sum).map_or(Value::Null, Value::Number),
            })
        }
    }
}

fn operand_error(op: &str, value: &Value) -> ConnectionError {
    ConnectionError::execution(format!("{op}: unsupported {} operand", json_kind(value)))
}
