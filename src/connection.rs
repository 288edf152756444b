//! Relay-style connection results
//!
//! Turns the raw rows of an executed plan into edges, page info and the
//! total count.

use crate::ast::{ConnectionQuery, TOTAL_COUNT_FIELD};
use crate::cursor::Cursor;
use crate::error::{ConnectionError, ConnectionResult};
use crate::executor::{StepId, StepResults};
use serde::Serialize;
use serde_json::Value;

/// Key added to every node naming its concrete type
pub const TYPENAME_FIELD: &str = "__typename";

/// A page of nodes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub edges: Vec<Edge>,
    pub page_info: PageInfo,
    /// Rows matching the filter, regardless of cursor and page size
    pub total_count: u64,
}

/// A single node with its cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub cursor: String,
    pub node: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

impl Connection {
    /// Build the connection from the rows each step of `query.plan` returned
    pub fn from_rows(query: &ConnectionQuery, mut results: StepResults) -> ConnectionResult<Self> {
        let page_size = usize::try_from(query.pagination.page_size).unwrap_or(usize::MAX);

        let mut rows = results.take(StepId::Records);
        let has_more = rows.len() > page_size;
        rows.truncate(page_size);
        if query.pagination.is_backward() {
            rows.reverse();
        }

        let keys = query.order.key_extractor();
        let edges: Vec<Edge> = rows
            .into_iter()
            .map(|row| Edge {
                cursor: Cursor::new(keys.extract(&row)).to_string(),
                node: shape_node(row, &query.node_type.name),
            })
            .collect();

        let total_count = read_total_count(&results.take(StepId::TotalCount))?;

        let beyond_cursor = query.has_cursor && !results.take(StepId::BeyondCursor).is_empty();

        let (has_next_page, has_previous_page) = if query.pagination.is_backward() {
            (beyond_cursor, has_more)
        } else {
            (has_more, beyond_cursor)
        };

        Ok(Self {
            page_info: PageInfo {
                has_next_page,
                has_previous_page,
                start_cursor: edges.first().map(|e| e.cursor.clone()),
                end_cursor: edges.last().map(|e| e.cursor.clone()),
            },
            edges,
            total_count,
        })
    }

    /// The nodes, in page order
    pub fn nodes(&self) -> impl Iterator<Item = &Value> {
        self.edges.iter().map(|e| &e.node)
    }
}

/// Drop `__`-prefixed bookkeeping keys and name the node's type
pub fn shape_node(row: Value, type_name: &str) -> Value {
    match row {
        Value::Object(mut object) => {
            object.retain(|key, _| !key.starts_with("__"));
            object.insert(TYPENAME_FIELD.to_string(), Value::String(type_name.to_string()));
            Value::Object(object)
        }
        other => other,
    }
}

fn read_total_count(rows: &[Value]) -> ConnectionResult<u64> {
    match rows.first() {
        // a count over nothing yields no row
        None => Ok(0),
        Some(row) => row
            .get(TOTAL_COUNT_FIELD)
            .and_then(Value::as_u64)
            .ok_or_else(|| ConnectionError::execution(format!("malformed count row {row}"))),
    }
}
