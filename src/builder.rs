//! Request model for connection and node queries
//!
//! These types are produced by the upstream query layer (already parsed and
//! permission-checked) and consumed by the compilers in [`crate::ast`].

use crate::error::{ConnectionError, ConnectionResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A paginated connection request for one node type
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub node_type: String,
    #[serde(default)]
    pub filter: Option<FilterExpr>,
    #[serde(default)]
    pub order: Option<OrderSpec>,
    #[serde(default)]
    pub first: Option<i64>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub last: Option<i64>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub aggregation_fields: Vec<AggregationField>,
}

impl ConnectionRequest {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order = Some(order);
        self
    }

    pub fn first(mut self, n: i64) -> Self {
        self.first = Some(n);
        self
    }

    pub fn last(mut self, n: i64) -> Self {
        self.last = Some(n);
        self
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    pub fn with_aggregation_field(mut self, field: AggregationField) -> Self {
        self.aggregation_fields.push(field);
        self
    }
}

/// Lookup of a single node by its global id
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRequest {
    pub id: String,
    /// The type the caller asked for: a concrete type, an interface or a union.
    /// `None` accepts any type.
    #[serde(default)]
    pub expected_type: Option<String>,
    #[serde(default)]
    pub aggregation_fields: Vec<AggregationField>,
}

impl NodeRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            expected_type: None,
            aggregation_fields: vec![],
        }
    }

    pub fn expecting(mut self, type_name: impl Into<String>) -> Self {
        self.expected_type = Some(type_name.into());
        self
    }
}

/// A requested computed or aliased field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationField {
    #[serde(default)]
    pub alias: Option<String>,
    pub source_field: String,
}

impl AggregationField {
    pub fn new(source_field: impl Into<String>) -> Self {
        Self {
            alias: None,
            source_field: source_field.into(),
        }
    }

    pub fn aliased(alias: impl Into<String>, source_field: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            source_field: source_field.into(),
        }
    }
}

/// Filter comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanEqualTo,
    GreaterThan,
    GreaterThanEqualTo,
    In,
    NotIn,
    Contains,
    StartsWith,
    Like,
    ILike,
    Is,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "neq",
            Self::LessThan => "lt",
            Self::LessThanEqualTo => "lte",
            Self::GreaterThan => "gt",
            Self::GreaterThanEqualTo => "gte",
            Self::In => "in",
            Self::NotIn => "nin",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::Like => "like",
            Self::ILike => "ilike",
            Self::Is => "is",
        }
    }
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "eq" => Ok(Self::Equal),
            "neq" => Ok(Self::NotEqual),
            "lt" => Ok(Self::LessThan),
            "lte" => Ok(Self::LessThanEqualTo),
            "gt" => Ok(Self::GreaterThan),
            "gte" => Ok(Self::GreaterThanEqualTo),
            "in" => Ok(Self::In),
            "nin" => Ok(Self::NotIn),
            "contains" => Ok(Self::Contains),
            "startsWith" => Ok(Self::StartsWith),
            "like" => Ok(Self::Like),
            "ilike" => Ok(Self::ILike),
            "is" => Ok(Self::Is),
            _ => Err(input.to_string()),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator as written by the caller; unknown names survive parsing and are
/// rejected by the filter compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOpName {
    Known(FilterOp),
    Unsupported(String),
}

impl From<&str> for FilterOpName {
    fn from(input: &str) -> Self {
        match input.parse() {
            Ok(op) => Self::Known(op),
            Err(name) => Self::Unsupported(name),
        }
    }
}

impl From<FilterOp> for FilterOpName {
    fn from(op: FilterOp) -> Self {
        Self::Known(op)
    }
}

/// A structured filter expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Field {
        field: String,
        op: FilterOpName,
        value: Value,
    },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn field(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self::Field {
            field: field.into(),
            op: op.into(),
            value,
        }
    }

    pub fn and(elems: Vec<FilterExpr>) -> Self {
        Self::And(elems)
    }

    pub fn or(elems: Vec<FilterExpr>) -> Self {
        Self::Or(elems)
    }

    pub fn not(elem: FilterExpr) -> Self {
        Self::Not(Box::new(elem))
    }

    /// Parse the `{field: {op: value}, and: [...], or: [...], not: {...}}`
    /// input shape. Several keys in one object are combined with AND.
    pub fn from_json(value: &Value) -> ConnectionResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ConnectionError::type_mismatch("filter", "object", json_kind(value)))?;

        let mut elems = Vec::with_capacity(object.len());
        for (key, inner) in object {
            match key.as_str() {
                "and" | "or" => {
                    let items = inner.as_array().ok_or_else(|| {
                        ConnectionError::type_mismatch(key, "list", json_kind(inner))
                    })?;
                    let parsed = items
                        .iter()
                        .map(Self::from_json)
                        .collect::<ConnectionResult<Vec<_>>>()?;
                    elems.push(if key == "and" {
                        Self::And(parsed)
                    } else {
                        Self::Or(parsed)
                    });
                }
                "not" => elems.push(Self::not(Self::from_json(inner)?)),
                field => {
                    let ops = inner.as_object().ok_or_else(|| {
                        ConnectionError::type_mismatch(field, "operator object", json_kind(inner))
                    })?;
                    for (op, operand) in ops {
                        elems.push(Self::Field {
                            field: field.to_string(),
                            op: op.as_str().into(),
                            value: operand.clone(),
                        });
                    }
                }
            }
        }

        Ok(if elems.len() == 1 {
            elems.remove(0)
        } else {
            Self::And(elems)
        })
    }

    /// Every field name referenced anywhere in the tree
    pub fn referenced_fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Field { field, .. } => {
                out.insert(field.as_str());
            }
            Self::And(elems) | Self::Or(elems) => {
                for elem in elems {
                    elem.collect_fields(out);
                }
            }
            Self::Not(elem) => elem.collect_fields(out),
        }
    }
}

impl<'de> Deserialize<'de> for FilterExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum OrderDirection {
    #[default]
    #[serde(alias = "asc", alias = "ASC")]
    Asc,
    #[serde(alias = "desc", alias = "DESC")]
    Desc,
}

impl OrderDirection {
    pub fn is_asc(&self) -> bool {
        matches!(self, Self::Asc)
    }

    pub fn reverse(&self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrderElem {
    pub field: String,
    #[serde(default)]
    pub direction: OrderDirection,
}

impl OrderElem {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Caller-supplied ordering, most significant field first
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct OrderSpec {
    pub elems: Vec<OrderElem>,
}

impl OrderSpec {
    pub fn new(elems: Vec<OrderElem>) -> Self {
        Self { elems }
    }
}

/// Which end of the ordering a page is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Forward,
    Backward,
}

impl PageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Validated pagination arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub direction: PageDirection,
    /// Rows to return, already clamped to `max_rows`
    pub page_size: u64,
}

impl Pagination {
    /// Validate first/last/after/before against each other
    pub fn from_request(request: &ConnectionRequest, max_rows: u64) -> ConnectionResult<Self> {
        if request.first.is_some() && request.last.is_some() {
            return Err(ConnectionError::invalid_pagination(
                "\"first\" and \"last\" may not be used together",
            ));
        }
        if request.after.is_some() && request.before.is_some() {
            return Err(ConnectionError::invalid_pagination(
                "\"after\" and \"before\" may not be used together",
            ));
        }
        if request.after.is_some() && request.last.is_some() {
            return Err(ConnectionError::invalid_pagination(
                "\"after\" requires forward pagination with \"first\"",
            ));
        }
        if request.before.is_some() && request.first.is_some() {
            return Err(ConnectionError::invalid_pagination(
                "\"before\" requires backward pagination with \"last\"",
            ));
        }

        let (direction, count) = match (request.first, request.last) {
            (_, Some(last)) => (PageDirection::Backward, Some(last)),
            (Some(first), None) => (PageDirection::Forward, Some(first)),
            (None, None) if request.before.is_some() => (PageDirection::Backward, None),
            (None, None) => (PageDirection::Forward, None),
        };

        let page_size = match count {
            Some(n) if n < 0 => {
                return Err(ConnectionError::invalid_pagination(format!(
                    "page size must not be negative, got {n}"
                )))
            }
            Some(n) => std::cmp::min(n as u64, max_rows),
            None => max_rows,
        };

        Ok(Self {
            direction,
            page_size,
        })
    }

    pub fn is_backward(&self) -> bool {
        self.direction == PageDirection::Backward
    }
}
