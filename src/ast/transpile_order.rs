//! Order compilation
//!
//! Every compiled order is total: the primary key is appended as the final
//! ascending key when the caller did not order by it. The same order drives
//! the `$sort` stage, the cursor boundary and the cursor of each result row.

use super::expr::FieldPath;
use super::stage::{SortKey, Stage};
use super::transpile_aggregate::FieldResolver;
use crate::builder::{json_kind, OrderDirection, OrderElem, OrderSpec};
use crate::error::{ConnectionError, ConnectionResult};
use crate::schema::{Field, NodeType};
use itertools::Itertools;
use serde_json::Value;

/// One key of a compiled order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    /// Declared field name
    pub field: String,
    /// Where the value lives in a result row
    pub path: FieldPath,
    pub direction: OrderDirection,
    /// Declaration, for cursor validation
    pub definition: Field,
}

impl OrderKey {
    pub fn sort_key(&self) -> SortKey {
        SortKey::new(self.path.clone(), self.direction)
    }
}

/// A total order over a node type
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledOrder {
    pub keys: Vec<OrderKey>,
}

impl CompiledOrder {
    /// Compile the caller's order, appending the primary-key tie-break
    pub fn compile(
        order: Option<&OrderSpec>,
        node_type: &NodeType,
        fields: &FieldResolver<'_>,
    ) -> ConnectionResult<Self> {
        let pk = OrderElem::asc(node_type.primary_key.as_str());
        let elems = order
            .map(|o| o.elems.as_slice())
            .unwrap_or_default()
            .iter()
            .chain(std::iter::once(&pk))
            // later repetitions cannot change the order
            .unique_by(|elem| elem.field.clone());

        let mut keys = Vec::new();
        for elem in elems {
            let field = node_type.require_field(&elem.field)?;
            if !field.field_type.is_orderable() {
                return Err(ConnectionError::type_mismatch(
                    &field.name,
                    "an orderable scalar",
                    field.field_type.to_string(),
                ));
            }
            keys.push(OrderKey {
                field: field.name.clone(),
                path: FieldPath::new(fields.lookup_key(field)),
                direction: elem.direction,
                definition: field.clone(),
            });
        }

        Ok(Self { keys })
    }

    /// The same order with every direction flipped
    pub fn reverse(&self) -> Self {
        Self {
            keys: self
                .keys
                .iter()
                .map(|k| OrderKey {
                    direction: k.direction.reverse(),
                    ..k.clone()
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn sort_stage(&self) -> Stage {
        Stage::Sort(self.keys.iter().map(OrderKey::sort_key).collect())
    }

    pub fn key_extractor(&self) -> KeyExtractor {
        KeyExtractor {
            paths: self.keys.iter().map(|k| k.path.clone()).collect(),
        }
    }

    /// Declared names, most significant first
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.field.as_str())
    }

    /// Check a decoded cursor tuple against this order
    pub fn validate_cursor(&self, values: &[Value]) -> ConnectionResult<()> {
        if values.len() != self.keys.len() {
            return Err(ConnectionError::invalid_cursor(format!(
                "cursor holds {} value(s) but the order has {} key(s) ({})",
                values.len(),
                self.keys.len(),
                self.fields().join(", ")
            )));
        }
        for (key, value) in self.keys.iter().zip(values) {
            if !key.definition.accepts(value) {
                return Err(ConnectionError::invalid_cursor(format!(
                    "{} value for {} which is {}",
                    json_kind(value),
                    key.field,
                    key.definition.field_type
                )));
            }
        }
        Ok(())
    }
}

/// Reads the ordering tuple of a result row
#[derive(Debug, Clone, PartialEq)]
pub struct KeyExtractor {
    paths: Vec<FieldPath>,
}

impl KeyExtractor {
    /// Missing values read as null
    pub fn extract(&self, row: &Value) -> Vec<Value> {
        self.paths
            .iter()
            .map(|p| p.lookup(row).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
