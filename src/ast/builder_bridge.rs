//! Bridge between request types and the pipeline AST
//!
//! This module provides the `ToPipeline` trait implemented by the request
//! types, the context every compiler reads, and the small stage builders
//! shared between the connection and node compilers.

use super::expr::{Expr, ValueExpr};
use super::stage::Stage;
use crate::config::CompilerConfig;
use crate::error::{ConnectionError, ConnectionResult};
use crate::node_id::{TYPE_TAG_OFFSET, TYPE_TAG_WIDTH};
use crate::schema::{NodeType, Schema};
use serde_json::Value;

/// Bookkeeping key holding the type tag sliced from the primary key
pub const TYPE_TAG_FIELD: &str = "__typeTag";

/// Trait for converting requests to executable pipelines
pub trait ToPipeline {
    /// What the request compiles to
    type Output;

    fn to_pipeline(&self, ctx: &CompileContext<'_>) -> ConnectionResult<Self::Output>;
}

/// Read-only inputs of a compilation
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub schema: &'a Schema,
    pub config: &'a CompilerConfig,
}

impl<'a> CompileContext<'a> {
    pub fn new(schema: &'a Schema, config: &'a CompilerConfig) -> Self {
        Self { schema, config }
    }

    pub fn max_rows(&self) -> u64 {
        self.config.max_rows
    }
}

/// Stages restricting a collection to documents of `node_type`.
///
/// Empty when no other storable type shares the collection.
pub fn build_type_scope(schema: &Schema, node_type: &NodeType) -> ConnectionResult<Vec<Stage>> {
    if !schema.shares_collection(node_type) {
        return Ok(vec![]);
    }

    let tag = node_type
        .type_tag
        .as_ref()
        .ok_or_else(|| ConnectionError::invalid_node_type(&node_type.name, "no type tag"))?;

    Ok(vec![
        Stage::AddFields(vec![(
            TYPE_TAG_FIELD.to_string(),
            ValueExpr::substr(
                ValueExpr::field(node_type.primary_key.as_str()),
                TYPE_TAG_OFFSET,
                TYPE_TAG_WIDTH,
            ),
        )]),
        Stage::Match(Expr::eq(TYPE_TAG_FIELD, Value::String(tag.to_string()))),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_id::TypeTag;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            NodeType::new("Cat", "animals", TypeTag::new("CAT").unwrap()),
            NodeType::new("Dog", "animals", TypeTag::new("DOG").unwrap()),
            NodeType::new("User", "users", TypeTag::new("USR").unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn test_scope_for_shared_collection() {
        let schema = schema();
        let stages = build_type_scope(&schema, schema.get("Dog").unwrap()).unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::AddFields(vec![(
                    "__typeTag".into(),
                    ValueExpr::substr(ValueExpr::field("id"), 1, 3)
                )]),
                Stage::Match(Expr::eq("__typeTag", json!("DOG"))),
            ]
        );
    }

    #[test]
    fn test_no_scope_for_own_collection() {
        let schema = schema();
        assert!(build_type_scope(&schema, schema.get("User").unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_context() {
        let schema = schema();
        let config = CompilerConfig::default().with_max_rows(7);
        assert_eq!(CompileContext::new(&schema, &config).max_rows(), 7);
    }
}
