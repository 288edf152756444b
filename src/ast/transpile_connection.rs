//! Pipeline compilation for connection requests
//!
//! A [`ConnectionRequest`] compiles to an execution plan of independent
//! pipelines:
//! - `records`: the page, fetched in pagination order with one extra row
//! - `total_count`: matching rows, ignoring the cursor and the page size
//! - `beyond_cursor`: whether a row exists at or beyond the cursor on the far
//!   side (only when a cursor was given)
//!
//! Compilation fails on the first problem found, checked in this order: type
//! scope, filter, aggregation fields, order, cursor, pagination arguments.

use super::builder_bridge::{build_type_scope, CompileContext, ToPipeline};
use super::expr::{combine_with_and, combine_with_or, CompareOp, Expr};
use super::stage::{Pipeline, Stage};
use super::transpile_aggregate::FieldResolver;
use super::transpile_filter::build_filter_expr;
use super::transpile_order::{CompiledOrder, OrderKey};
use crate::builder::{ConnectionRequest, Pagination};
use crate::cursor::Cursor;
use crate::error::ConnectionResult;
use crate::executor::{ExecutionPlan, ExecutionStep, PlanTelemetry, StepId};
use crate::schema::NodeType;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Key of the single row produced by the total-count pipeline
pub const TOTAL_COUNT_FIELD: &str = "totalCount";

/// The result of compiling a connection request
#[derive(Debug)]
pub struct ConnectionQuery {
    pub node_type: Arc<NodeType>,
    pub pagination: Pagination,
    /// The requested order (not reversed for backward pages)
    pub order: CompiledOrder,
    /// Whether `after`/`before` was given
    pub has_cursor: bool,
    pub plan: ExecutionPlan,
}

impl ToPipeline for ConnectionRequest {
    type Output = ConnectionQuery;

    fn to_pipeline(&self, ctx: &CompileContext<'_>) -> ConnectionResult<Self::Output> {
        let node_type = ctx.schema.storable(&self.node_type)?;
        let collection = node_type.collection_name()?;
        let scope = build_type_scope(ctx.schema, node_type)?;

        let fields = FieldResolver::new(node_type, &self.aggregation_fields);

        let filter = self
            .filter
            .as_ref()
            .map(|f| build_filter_expr(f, node_type, &fields))
            .transpose()?;

        fields.validate()?;

        let order = CompiledOrder::compile(self.order.as_ref(), node_type, &fields)?;

        // both tokens are checked even though only one may be used
        let mut cursor_values = None;
        for token in [self.after.as_deref(), self.before.as_deref()]
            .into_iter()
            .flatten()
        {
            let cursor: Cursor = token.parse()?;
            order.validate_cursor(&cursor.values)?;
            cursor_values.get_or_insert(cursor.values);
        }

        let pagination = Pagination::from_request(self, ctx.max_rows())?;

        let mut referenced: BTreeSet<&str> = self
            .filter
            .as_ref()
            .map(|f| f.referenced_fields())
            .unwrap_or_default();
        referenced.extend(order.fields());

        // scope + pre-filter materializations + filter, shared by every step
        let mut base = Pipeline::new(collection);
        base.extend(scope);
        base.extend(fields.pre_filter_stage(&referenced));
        match filter {
            None | Some(Expr::Literal(true)) => {}
            Some(expr) => base.push(Stage::Match(expr)),
        }

        let fetch_order = if pagination.is_backward() {
            order.reverse()
        } else {
            order.clone()
        };

        let mut records = base.clone();
        records.push(fetch_order.sort_stage());
        if let Some(values) = &cursor_values {
            records.push(Stage::Match(build_cursor_boundary(
                &fetch_order,
                values,
                false,
            )));
        }
        // one extra row tells whether another page follows
        records.push(Stage::Limit(pagination.page_size.saturating_add(1)));
        records.extend(fields.post_limit_stage(&referenced));

        let mut total_count = base.clone();
        total_count.push(Stage::Count(TOTAL_COUNT_FIELD.to_string()));

        let mut steps = vec![
            ExecutionStep::new(StepId::Records, records, "page rows"),
            ExecutionStep::new(StepId::TotalCount, total_count, "total count"),
        ];

        if let Some(values) = &cursor_values {
            let far_order = fetch_order.reverse();
            let mut beyond = base;
            beyond.push(far_order.sort_stage());
            beyond.push(Stage::Match(build_cursor_boundary(&far_order, values, true)));
            beyond.push(Stage::Limit(1));
            steps.push(ExecutionStep::new(
                StepId::BeyondCursor,
                beyond,
                "rows beyond the cursor",
            ));
        }

        let telemetry = PlanTelemetry::new()
            .with_node_type(node_type.name.as_str())
            .with_tag("direction", pagination.direction.as_str())
            .with_tag("page_size", pagination.page_size.to_string());

        Ok(ConnectionQuery {
            node_type: Arc::clone(node_type),
            pagination,
            order,
            has_cursor: cursor_values.is_some(),
            plan: ExecutionPlan::multi(steps).with_telemetry(telemetry),
        })
    }
}

/// Build the cursor boundary predicate
///
/// Matches rows strictly after the cursor in `order`, plus the cursor row
/// itself when `allow_equality` is set:
///
/// ```text
/// (k1 ≻ v1) OR (k1 = v1 AND ((k2 ≻ v2) OR (k2 = v2 AND …)))
/// ```
pub fn build_cursor_boundary(order: &CompiledOrder, values: &[Value], allow_equality: bool) -> Expr {
    build_cursor_boundary_recursive(&order.keys, values, allow_equality)
}

fn build_cursor_boundary_recursive(keys: &[OrderKey], values: &[Value], allow_equality: bool) -> Expr {
    let (Some((key, keys)), Some((value, values))) = (keys.split_first(), values.split_first())
    else {
        return Expr::Literal(allow_equality);
    };

    let after = build_after_expr(key, value);
    let rest = build_cursor_boundary_recursive(keys, values, allow_equality);

    let tied = match rest {
        Expr::Literal(false) => Expr::Literal(false),
        rest => combine_with_and(vec![build_equal_expr(key, value), rest]),
    };

    combine_with_or(vec![after, tied])
}

/// Rows strictly after `value` on this key; nulls sort lowest
fn build_after_expr(key: &OrderKey, value: &Value) -> Expr {
    match (key.direction.is_asc(), value.is_null()) {
        (true, true) => Expr::is_not_null(key.path.clone()),
        (true, false) => Expr::compare(key.path.clone(), CompareOp::Gt, value.clone()),
        // nothing sorts below null
        (false, true) => Expr::Literal(false),
        (false, false) => combine_with_or(vec![
            Expr::compare(key.path.clone(), CompareOp::Lt, value.clone()),
            Expr::is_null(key.path.clone()),
        ]),
    }
}

fn build_equal_expr(key: &OrderKey, value: &Value) -> Expr {
    if value.is_null() {
        Expr::is_null(key.path.clone())
    } else {
        Expr::eq(key.path.clone(), value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FilterExpr, FilterOp, OrderDirection, OrderElem, OrderSpec};
    use crate::config::CompilerConfig;
    use crate::cursor;
    use crate::error::ConnectionError;
    use crate::node_id::TypeTag;
    use crate::schema::{Field, FieldType, Schema};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![NodeType::new("User", "users", TypeTag::new("USR").unwrap())
            .with_field(Field::new("lastName", FieldType::String))
            .with_field(Field::new("age", FieldType::Int))])
        .unwrap()
    }

    fn compile(request: &ConnectionRequest) -> ConnectionResult<ConnectionQuery> {
        let schema = schema();
        let config = CompilerConfig::default();
        request.to_pipeline(&CompileContext::new(&schema, &config))
    }

    fn order_of(elems: Vec<OrderElem>) -> CompiledOrder {
        let schema = schema();
        let node_type = schema.get("User").unwrap();
        let fields = FieldResolver::new(node_type, &[]);
        CompiledOrder::compile(Some(&OrderSpec::new(elems)), node_type, &fields).unwrap()
    }

    #[test]
    fn test_boundary_two_keys() {
        let order = order_of(vec![OrderElem::asc("lastName")]);
        let boundary = build_cursor_boundary(&order, &[json!("B"), json!("1USR3")], false);
        assert_eq!(
            boundary,
            Expr::Or(vec![
                Expr::compare("lastName", CompareOp::Gt, json!("B")),
                Expr::And(vec![
                    Expr::eq("lastName", json!("B")),
                    Expr::compare("id", CompareOp::Gt, json!("1USR3")),
                ]),
            ])
        );
    }

    #[test]
    fn test_boundary_allow_equality() {
        let order = order_of(vec![]);
        let boundary = build_cursor_boundary(&order, &[json!("1USR3")], true);
        assert_eq!(
            boundary,
            Expr::Or(vec![
                Expr::compare("id", CompareOp::Gt, json!("1USR3")),
                Expr::eq("id", json!("1USR3")),
            ])
        );
    }

    #[test]
    fn test_boundary_nulls() {
        let order = order_of(vec![OrderElem::desc("lastName")]);
        // desc past a null: only ties on the null can follow
        let boundary = build_cursor_boundary(&order, &[Value::Null, json!("1USR1")], false);
        assert_eq!(
            boundary,
            Expr::And(vec![
                Expr::is_null("lastName"),
                Expr::compare("id", CompareOp::Gt, json!("1USR1")),
            ])
        );

        let order = order.reverse();
        let boundary = build_cursor_boundary(&order, &[Value::Null, json!("1USR1")], false);
        assert_eq!(
            boundary,
            Expr::Or(vec![
                Expr::is_not_null("lastName"),
                Expr::And(vec![
                    Expr::is_null("lastName"),
                    Expr::Or(vec![
                        Expr::compare("id", CompareOp::Lt, json!("1USR1")),
                        Expr::is_null("id"),
                    ]),
                ]),
            ])
        );
    }

    #[test]
    fn test_records_pipeline_shape() {
        let request = ConnectionRequest::new("User")
            .with_filter(FilterExpr::field("lastName", FilterOp::Equal, json!("B")))
            .first(2);
        let query = compile(&request).unwrap();

        assert_eq!(query.plan.step_count(), 2);
        let records = &query.plan.get_step(StepId::Records).unwrap().pipeline;
        assert_eq!(records.collection, "users");
        assert_eq!(
            records.stages,
            vec![
                Stage::Match(Expr::eq("lastName", json!("B"))),
                order_of(vec![]).sort_stage(),
                Stage::Limit(3),
            ]
        );
        let count = &query.plan.get_step(StepId::TotalCount).unwrap().pipeline;
        assert_eq!(
            count.stages.last(),
            Some(&Stage::Count(TOTAL_COUNT_FIELD.to_string()))
        );
    }

    #[test]
    fn test_backward_pipeline_reverses_sort() {
        let token = cursor::encode(&[json!("1USR5")]);
        let query = compile(&ConnectionRequest::new("User").last(2).before(token)).unwrap();

        assert!(query.pagination.is_backward());
        assert!(query.has_cursor);
        let records = &query.plan.get_step(StepId::Records).unwrap().pipeline;
        match &records.stages[0] {
            Stage::Sort(keys) => assert_eq!(keys[0].direction, OrderDirection::Desc),
            other => panic!("expected $sort, got {other:?}"),
        }

        let beyond = &query.plan.get_step(StepId::BeyondCursor).unwrap().pipeline;
        assert_eq!(
            beyond.stages,
            vec![
                order_of(vec![]).sort_stage(),
                Stage::Match(Expr::Or(vec![
                    Expr::compare("id", CompareOp::Gt, json!("1USR5")),
                    Expr::eq("id", json!("1USR5")),
                ])),
                Stage::Limit(1),
            ]
        );
    }

    #[test]
    fn test_cursor_must_match_order() {
        let token = cursor::encode(&[json!("1USR5")]);
        let request = ConnectionRequest::new("User")
            .with_order(OrderSpec::new(vec![OrderElem::asc("lastName")]))
            .after(token);
        assert!(matches!(compile(&request), Err(ConnectionError::InvalidCursor(_))));
    }

    #[test]
    fn test_failure_order() {
        // filter problems are reported before cursor and pagination problems
        let request = ConnectionRequest::new("User")
            .with_filter(FilterExpr::field("nickname", FilterOp::Equal, json!("x")))
            .after("garbage")
            .first(-1);
        assert!(matches!(compile(&request), Err(ConnectionError::UnknownField { .. })));

        let request = ConnectionRequest::new("User").after("garbage").first(-1);
        assert!(matches!(compile(&request), Err(ConnectionError::InvalidCursor(_))));

        let request = ConnectionRequest::new("Missing")
            .with_filter(FilterExpr::field("nickname", FilterOp::Equal, json!("x")));
        assert!(matches!(compile(&request), Err(ConnectionError::InvalidNodeType { .. })));
    }

    #[test]
    fn test_page_size_clamped() {
        let query = compile(&ConnectionRequest::new("User").first(1000)).unwrap();
        assert_eq!(query.pagination.page_size, 30);
        let records = &query.plan.get_step(StepId::Records).unwrap().pipeline;
        assert_eq!(records.stages.last(), Some(&Stage::Limit(31)));
    }

    #[test]
    fn test_unbounded_max_rows() {
        let schema = schema();
        let config = CompilerConfig::default().with_max_rows(u64::MAX);
        let query = ConnectionRequest::new("User")
            .to_pipeline(&CompileContext::new(&schema, &config))
            .unwrap();

        assert_eq!(query.pagination.page_size, u64::MAX);
        let records = &query.plan.get_step(StepId::Records).unwrap().pipeline;
        assert_eq!(records.stages.last(), Some(&Stage::Limit(u64::MAX)));
    }
}
