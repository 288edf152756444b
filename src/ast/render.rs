//! Native pipeline rendering
//!
//! This module converts pipeline AST nodes into the store's JSON stage
//! vocabulary. It is the only place in the crate where native query
//! documents are constructed.
//!
//! Literals in `$addFields` are wrapped in `$literal` so a string that starts
//! with `$` is never read as a field reference. Match literals sit behind an
//! explicit operator (`$eq`, `$in`, ...) and are taken verbatim.

use super::expr::{CompareOp, Expr, FieldPath, ValueExpr};
use super::stage::{Pipeline, SortKey, Stage};
use serde_json::{json, Map, Value};

/// Trait for AST nodes that render to a native query document
pub trait Render {
    fn render(&self) -> Value;
}

impl Render for Pipeline {
    fn render(&self) -> Value {
        Value::Array(self.stages.iter().map(Render::render).collect())
    }
}

impl Render for Stage {
    fn render(&self) -> Value {
        let body = match self {
            Stage::Match(expr) => expr.render(),
            Stage::AddFields(fields) => {
                let mut object = Map::with_capacity(fields.len());
                for (key, value) in fields {
                    object.insert(key.clone(), value.render());
                }
                Value::Object(object)
            }
            Stage::Sort(keys) => render_sort(keys),
            Stage::Limit(n) => json!(n),
            Stage::Count(field) => json!(field),
        };
        let mut stage = Map::with_capacity(1);
        stage.insert(self.name().to_string(), body);
        Value::Object(stage)
    }
}

fn render_sort(keys: &[SortKey]) -> Value {
    // relies on serde_json's preserve_order: key order is significance order
    let mut object = Map::with_capacity(keys.len());
    for key in keys {
        let direction = if key.direction.is_asc() { 1 } else { -1 };
        object.insert(key.path.to_string(), json!(direction));
    }
    Value::Object(object)
}

impl Render for Expr {
    fn render(&self) -> Value {
        match self {
            Expr::Literal(true) => json!({}),
            Expr::Literal(false) => json!({ "$expr": false }),
            Expr::Compare { path, op, value } => field_predicate(path, op.as_native(), value.clone()),
            Expr::In {
                path,
                values,
                negated,
            } => {
                let op = if *negated { "$nin" } else { "$in" };
                field_predicate(path, op, Value::Array(values.clone()))
            }
            Expr::Regex {
                path,
                pattern,
                case_insensitive,
            } => {
                let mut body = Map::new();
                body.insert("$regex".into(), json!(pattern));
                if *case_insensitive {
                    body.insert("$options".into(), json!("i"));
                }
                let mut object = Map::with_capacity(1);
                object.insert(path.to_string(), Value::Object(body));
                Value::Object(object)
            }
            Expr::IsNull { path, negated } => {
                let op = if *negated {
                    CompareOp::Ne
                } else {
                    CompareOp::Eq
                };
                field_predicate(path, op.as_native(), Value::Null)
            }
            Expr::ContainsAll { path, values } => {
                field_predicate(path, "$all", Value::Array(values.clone()))
            }
            Expr::And(elems) => json!({ "$and": elems.iter().map(Render::render).collect::<Vec<_>>() }),
            Expr::Or(elems) => json!({ "$or": elems.iter().map(Render::render).collect::<Vec<_>>() }),
            Expr::Not(inner) => json!({ "$nor": [inner.render()] }),
        }
    }
}

fn field_predicate(path: &FieldPath, op: &str, operand: Value) -> Value {
    let mut body = Map::with_capacity(1);
    body.insert(op.to_string(), operand);
    let mut object = Map::with_capacity(1);
    object.insert(path.to_string(), Value::Object(body));
    Value::Object(object)
}

impl Render for ValueExpr {
    fn render(&self) -> Value {
        match self {
            ValueExpr::Field(path) => Value::String(format!("${path}")),
            ValueExpr::Literal(value) => json!({ "$literal": value }),
            ValueExpr::Substr { input, start, len } => {
                json!({ "$substrBytes": [input.render(), start, len] })
            }
            ValueExpr::Concat(parts) => {
                let parts: Vec<Value> = parts
                    .iter()
                    .map(|p| json!({ "$ifNull": [p.render(), ""] }))
                    .collect();
                json!({ "$concat": parts })
            }
            ValueExpr::Size(input) => json!({ "$size": { "$ifNull": [input.render(), []] } }),
            ValueExpr::Add(parts) => {
                let parts: Vec<Value> = parts
                    .iter()
                    .map(|p| json!({ "$ifNull": [p.render(), 0] }))
                    .collect();
                json!({ "$add": parts })
            }
        }
    }
}

// =========================================================================
// Convenience functions
// =========================================================================

/// Render a pipeline to its native stage array
pub fn render(pipeline: &Pipeline) -> Value {
    pipeline.render()
}

/// Render a pipeline as compact text, for logs
pub fn render_text(pipeline: &Pipeline) -> String {
    pipeline.render().to_string()
}

/// Render just a predicate
pub fn render_expr(expr: &Expr) -> Value {
    expr.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::OrderDirection;

    #[test]
    fn test_render_match() {
        let stage = Stage::Match(Expr::eq("lastName", json!("B")));
        assert_eq!(stage.render(), json!({"$match": {"lastName": {"$eq": "B"}}}));
    }

    #[test]
    fn test_render_sort_keeps_key_order() {
        let stage = Stage::Sort(vec![
            SortKey::new("lastName", OrderDirection::Desc),
            SortKey::new("id", OrderDirection::Asc),
        ]);
        let text = stage.render().to_string();
        assert_eq!(text, r#"{"$sort":{"lastName":-1,"id":1}}"#);
    }

    #[test]
    fn test_render_logical() {
        let expr = Expr::Or(vec![
            Expr::is_null("a"),
            Expr::not(Expr::In {
                path: "b".into(),
                values: vec![json!(1), json!(2)],
                negated: false,
            }),
        ]);
        assert_eq!(
            render_expr(&expr),
            json!({"$or": [
                {"a": {"$eq": null}},
                {"$nor": [{"b": {"$in": [1, 2]}}]}
            ]})
        );
    }

    #[test]
    fn test_render_constants() {
        assert_eq!(render_expr(&Expr::Literal(true)), json!({}));
        assert_eq!(render_expr(&Expr::Literal(false)), json!({"$expr": false}));
    }

    #[test]
    fn test_render_regex() {
        let expr = Expr::Regex {
            path: "name".into(),
            pattern: "^a.*$".into(),
            case_insensitive: true,
        };
        assert_eq!(
            render_expr(&expr),
            json!({"name": {"$regex": "^a.*$", "$options": "i"}})
        );
    }

    #[test]
    fn test_render_add_fields() {
        let stage = Stage::AddFields(vec![
            (
                "__typeTag".into(),
                ValueExpr::substr(ValueExpr::field("id"), 1, 3),
            ),
            ("marker".into(), ValueExpr::Literal(json!("$notAField"))),
        ]);
        assert_eq!(
            stage.render(),
            json!({"$addFields": {
                "__typeTag": {"$substrBytes": ["$id", 1, 3]},
                "marker": {"$literal": "$notAField"}
            }})
        );
    }

    #[test]
    fn test_render_pipeline() {
        let pipeline = Pipeline::new("users")
            .with_stage(Stage::Limit(3))
            .with_stage(Stage::Count("totalCount".into()));
        assert_eq!(
            render(&pipeline),
            json!([{"$limit": 3}, {"$count": "totalCount"}])
        );
        assert_eq!(render_text(&pipeline), r#"[{"$limit":3},{"$count":"totalCount"}]"#);
    }
}
