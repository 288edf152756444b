//! Pipeline compilation for single-node lookups
//!
//! The concrete type of a node is read from its id, so a lookup through an
//! interface or union needs no store round trip to find the collection.

use super::builder_bridge::{build_type_scope, CompileContext, ToPipeline};
use super::expr::Expr;
use super::stage::{Pipeline, Stage};
use super::transpile_aggregate::FieldResolver;
use crate::builder::NodeRequest;
use crate::error::{ConnectionError, ConnectionResult};
use crate::executor::{ExecutionPlan, PlanTelemetry, StepId};
use crate::node_id;
use crate::schema::{NodeKind, NodeType, Schema};
use serde_json::Value;
use std::sync::Arc;

/// The result of compiling a node request
#[derive(Debug)]
pub struct NodeQuery {
    /// Concrete type decoded from the id
    pub node_type: Arc<NodeType>,
    pub plan: ExecutionPlan,
}

impl ToPipeline for NodeRequest {
    /// `None` when the id names a type outside the expected one
    type Output = Option<NodeQuery>;

    fn to_pipeline(&self, ctx: &CompileContext<'_>) -> ConnectionResult<Self::Output> {
        let id = node_id::decode(&self.id)?;
        let node_type = ctx.schema.by_tag(&id.tag).ok_or_else(|| {
            ConnectionError::invalid_node_id(format!("no type uses the tag {}", id.tag))
        })?;

        if let Some(expected) = &self.expected_type {
            if !is_member(ctx.schema, node_type, expected)? {
                return Ok(None);
            }
        }

        let fields = FieldResolver::new(node_type, &self.aggregation_fields);
        fields.validate()?;

        let mut pipeline = Pipeline::new(node_type.collection_name()?);
        pipeline.extend(build_type_scope(ctx.schema, node_type)?);
        pipeline.push(Stage::Match(Expr::eq(
            node_type.primary_key.as_str(),
            Value::String(self.id.clone()),
        )));
        pipeline.push(Stage::Limit(1));
        pipeline.extend(fields.all_stage());

        let telemetry = PlanTelemetry::new()
            .with_node_type(node_type.name.as_str())
            .with_tag("lookup", "node");

        Ok(Some(NodeQuery {
            node_type: Arc::clone(node_type),
            plan: ExecutionPlan::single(StepId::Node, pipeline, "node by id")
                .with_telemetry(telemetry),
        }))
    }
}

/// Whether `concrete` satisfies the requested type, per the requested kind
pub fn is_member(schema: &Schema, concrete: &NodeType, expected: &str) -> ConnectionResult<bool> {
    let expected = schema
        .get(expected)
        .ok_or_else(|| ConnectionError::invalid_node_type(expected, "not defined"))?;

    Ok(match expected.kind {
        NodeKind::Type => expected.name == concrete.name,
        NodeKind::Interface => concrete.interfaces.contains(&expected.name),
        NodeKind::Union => expected.possible_types.contains(&concrete.name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AggregationField;
    use crate::config::CompilerConfig;
    use crate::node_id::TypeTag;
    use crate::schema::{ComputedField, Field, FieldType};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            NodeType::interface("Pet"),
            NodeType::new("Cat", "animals", TypeTag::new("CAT").unwrap()).implementing("Pet"),
            NodeType::new("Dog", "animals", TypeTag::new("DOG").unwrap())
                .implementing("Pet")
                .with_field(Field::new("tricks", FieldType::List(Box::new(FieldType::String))))
                .with_field(
                    Field::new("trickCount", FieldType::Int)
                        .computed(ComputedField::Size("tricks".into())),
                ),
            NodeType::new("User", "users", TypeTag::new("USR").unwrap()),
            NodeType::union("Owner", vec!["User".into()]),
        ])
        .unwrap()
    }

    fn compile(request: &NodeRequest) -> ConnectionResult<Option<NodeQuery>> {
        let schema = schema();
        let config = CompilerConfig::default();
        request.to_pipeline(&CompileContext::new(&schema, &config))
    }

    #[test]
    fn test_lookup_scoped_to_type() {
        let query = compile(&NodeRequest::new("1DOG7")).unwrap().unwrap();
        assert_eq!(query.node_type.name, "Dog");
        let step = query.plan.get_step(StepId::Node).unwrap();
        assert_eq!(step.pipeline.collection, "animals");
        assert_eq!(
            &step.pipeline.stages[1..],
            &[
                Stage::Match(Expr::eq("__typeTag", json!("DOG"))),
                Stage::Match(Expr::eq("id", json!("1DOG7"))),
                Stage::Limit(1),
            ]
        );
    }

    #[test]
    fn test_kind_dispatch() {
        let cases = [
            ("1DOG7", "Dog", true),
            ("1DOG7", "Cat", false),
            ("1DOG7", "Pet", true),
            ("1USR1", "Pet", false),
            ("1USR1", "Owner", true),
            ("1CAT2", "Owner", false),
        ];
        for (id, expected, found) in cases {
            let query = compile(&NodeRequest::new(id).expecting(expected)).unwrap();
            assert_eq!(query.is_some(), found, "{id} as {expected}");
        }
    }

    #[test]
    fn test_aggregation_fields_follow_limit() {
        let mut request = NodeRequest::new("1DOG7");
        request.aggregation_fields = vec![AggregationField::aliased("n", "trickCount")];
        let query = compile(&request).unwrap().unwrap();
        let stages = &query.plan.get_step(StepId::Node).unwrap().pipeline.stages;
        assert!(matches!(stages.last(), Some(Stage::AddFields(entries)) if entries[0].0 == "n"));
    }

    #[test]
    fn test_bad_ids() {
        assert!(matches!(
            compile(&NodeRequest::new("1XYZ1")),
            Err(ConnectionError::InvalidNodeId(_))
        ));
        assert!(matches!(
            compile(&NodeRequest::new("9")),
            Err(ConnectionError::InvalidNodeId(_))
        ));
        assert!(matches!(
            compile(&NodeRequest::new("1DOG7").expecting("Nope")),
            Err(ConnectionError::InvalidNodeType { .. })
        ));
    }
}
