//! Filter compilation
//!
//! Converts a [`FilterExpr`] tree into a match predicate. Every leaf is type
//! checked against the declared field; nothing else is evaluated at compile
//! time.

use super::expr::{combine_with_and, combine_with_or, CompareOp, Expr, FieldPath};
use super::transpile_aggregate::FieldResolver;
use crate::builder::{json_kind, FilterExpr, FilterOp, FilterOpName};
use crate::error::{ConnectionError, ConnectionResult};
use crate::schema::{Field, FieldType, NodeType};
use serde_json::Value;

/// Build a match predicate from a filter tree
pub fn build_filter_expr(
    filter: &FilterExpr,
    node_type: &NodeType,
    fields: &FieldResolver<'_>,
) -> ConnectionResult<Expr> {
    match filter {
        FilterExpr::Field { field, op, value } => {
            build_field_expr(field, op, value, node_type, fields)
        }
        FilterExpr::And(elems) => Ok(combine_with_and(
            elems
                .iter()
                .map(|e| build_filter_expr(e, node_type, fields))
                .collect::<ConnectionResult<Vec<_>>>()?,
        )),
        FilterExpr::Or(elems) => Ok(combine_with_or(
            elems
                .iter()
                .map(|e| build_filter_expr(e, node_type, fields))
                .collect::<ConnectionResult<Vec<_>>>()?,
        )),
        FilterExpr::Not(elem) => Ok(match build_filter_expr(elem, node_type, fields)? {
            Expr::Literal(b) => Expr::Literal(!b),
            other => Expr::not(other),
        }),
    }
}

/// Build the predicate for a single `{field: {op: value}}` leaf
fn build_field_expr(
    name: &str,
    op: &FilterOpName,
    value: &Value,
    node_type: &NodeType,
    fields: &FieldResolver<'_>,
) -> ConnectionResult<Expr> {
    let field = node_type.require_field(name)?;

    let op = match op {
        FilterOpName::Known(op) => *op,
        FilterOpName::Unsupported(op) => {
            return Err(ConnectionError::unsupported_operator(op, name))
        }
    };
    if !op_applies(op, &field.field_type) {
        return Err(ConnectionError::unsupported_operator(op.as_str(), name));
    }

    let path = FieldPath::new(fields.lookup_key(field));

    match op {
        FilterOp::Is => match value.as_str() {
            Some("NULL") => Ok(Expr::is_null(path)),
            Some("NOT_NULL") => Ok(Expr::is_not_null(path)),
            _ => Err(ConnectionError::type_mismatch(
                name,
                "NULL or NOT_NULL",
                json_kind(value),
            )),
        },
        // Comparing against null is never true; `is` is the null check
        _ if value.is_null() => Ok(Expr::Literal(false)),
        FilterOp::In | FilterOp::NotIn => {
            let items = value.as_array().ok_or_else(|| {
                ConnectionError::type_mismatch(
                    name,
                    format!("[{}]", field.field_type),
                    json_kind(value),
                )
            })?;
            for item in items {
                check_literal(field, item)?;
            }
            if op == FilterOp::In {
                Ok(Expr::In {
                    path,
                    values: items.clone(),
                    negated: false,
                })
            } else {
                Ok(combine_with_and(vec![
                    Expr::In {
                        path: path.clone(),
                        values: items.clone(),
                        negated: true,
                    },
                    Expr::is_not_null(path),
                ]))
            }
        }
        FilterOp::Contains => {
            // a bare element is shorthand for a one-element list
            let values = match value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            let accepted = field
                .field_type
                .list_element()
                .is_some_and(|element| values.iter().all(|v| element.accepts(v)));
            if !accepted {
                return Err(ConnectionError::type_mismatch(
                    name,
                    field.field_type.to_string(),
                    json_kind(value),
                ));
            }
            Ok(Expr::ContainsAll { path, values })
        }
        FilterOp::StartsWith | FilterOp::Like | FilterOp::ILike => {
            let text = value.as_str().ok_or_else(|| {
                ConnectionError::type_mismatch(name, "String", json_kind(value))
            })?;
            let pattern = match op {
                FilterOp::StartsWith => format!("^{}", regex::escape(text)),
                _ => like_to_regex(text),
            };
            Ok(Expr::Regex {
                path,
                pattern,
                case_insensitive: op == FilterOp::ILike,
            })
        }
        FilterOp::NotEqual => {
            check_literal(field, value)?;
            Ok(combine_with_and(vec![
                Expr::compare(path.clone(), CompareOp::Ne, value.clone()),
                Expr::is_not_null(path),
            ]))
        }
        FilterOp::Equal
        | FilterOp::LessThan
        | FilterOp::LessThanEqualTo
        | FilterOp::GreaterThan
        | FilterOp::GreaterThanEqualTo => {
            check_literal(field, value)?;
            let compare_op = match op {
                FilterOp::Equal => CompareOp::Eq,
                FilterOp::LessThan => CompareOp::Lt,
                FilterOp::LessThanEqualTo => CompareOp::Lte,
                FilterOp::GreaterThan => CompareOp::Gt,
                _ => CompareOp::Gte,
            };
            Ok(Expr::compare(path, compare_op, value.clone()))
        }
    }
}

/// Whether `op` is meaningful for a field of type `field_type`
pub fn op_applies(op: FilterOp, field_type: &FieldType) -> bool {
    match op {
        FilterOp::Is => true,
        FilterOp::Equal | FilterOp::NotEqual | FilterOp::In | FilterOp::NotIn => {
            field_type.is_orderable()
        }
        FilterOp::LessThan
        | FilterOp::LessThanEqualTo
        | FilterOp::GreaterThan
        | FilterOp::GreaterThanEqualTo => {
            field_type.is_orderable() && *field_type != FieldType::Boolean
        }
        FilterOp::Contains => field_type.list_element().is_some(),
        FilterOp::StartsWith | FilterOp::Like | FilterOp::ILike => field_type.is_textual(),
    }
}

fn check_literal(field: &Field, value: &Value) -> ConnectionResult<()> {
    if value.is_null() || !field.field_type.accepts(value) {
        return Err(ConnectionError::type_mismatch(
            &field.name,
            field.field_type.to_string(),
            json_kind(value),
        ));
    }
    Ok(())
}

/// Translate a SQL LIKE pattern (`%` any run, `_` any one character) into an
/// anchored regular expression
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AggregationField;
    use crate::node_id::TypeTag;
    use crate::schema::ComputedField;
    use serde_json::json;
    use test_case::test_case;

    fn user() -> NodeType {
        NodeType::new("User", "users", TypeTag::new("USR").unwrap())
            .with_field(Field::new("lastName", FieldType::String))
            .with_field(Field::new("age", FieldType::Int))
            .with_field(Field::new("active", FieldType::Boolean))
            .with_field(Field::new("profile", FieldType::Json))
            .with_field(Field::new("tags", FieldType::List(Box::new(FieldType::String))))
            .with_field(
                Field::new("tagCount", FieldType::Int).computed(ComputedField::Size("tags".into())),
            )
    }

    fn compile(filter: Value) -> ConnectionResult<Expr> {
        let node_type = user();
        let resolver = FieldResolver::new(&node_type, &[]);
        let filter = FilterExpr::from_json(&filter)?;
        build_filter_expr(&filter, &node_type, &resolver)
    }

    #[test]
    fn test_equality() {
        assert_eq!(
            compile(json!({"lastName": {"eq": "B"}})).unwrap(),
            Expr::eq("lastName", json!("B"))
        );
    }

    #[test]
    fn test_not_equal_excludes_nulls() {
        assert_eq!(
            compile(json!({"age": {"neq": 3}})).unwrap(),
            Expr::And(vec![
                Expr::compare("age", CompareOp::Ne, json!(3)),
                Expr::is_not_null("age"),
            ])
        );
    }

    #[test]
    fn test_null_literal_is_false() {
        assert_eq!(
            compile(json!({"lastName": {"eq": null}})).unwrap(),
            Expr::Literal(false)
        );
        assert_eq!(
            compile(json!({"not": {"age": {"gt": null}}})).unwrap(),
            Expr::Literal(true)
        );
    }

    #[test]
    fn test_is() {
        assert_eq!(
            compile(json!({"age": {"is": "NULL"}})).unwrap(),
            Expr::is_null("age")
        );
        assert_eq!(
            compile(json!({"profile": {"is": "NOT_NULL"}})).unwrap(),
            Expr::is_not_null("profile")
        );
        assert!(matches!(
            compile(json!({"age": {"is": "MAYBE"}})),
            Err(ConnectionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_logical() {
        assert_eq!(compile(json!({"and": []})).unwrap(), Expr::Literal(true));
        assert_eq!(compile(json!({"or": []})).unwrap(), Expr::Literal(false));
    }

    #[test]
    fn test_like_patterns() {
        assert_eq!(like_to_regex("a%b_c"), "^a.*b.c$");
        assert_eq!(like_to_regex("1.5%"), r"^1\.5.*$");
        assert_eq!(
            compile(json!({"lastName": {"ilike": "sm%"}})).unwrap(),
            Expr::Regex {
                path: "lastName".into(),
                pattern: "^sm.*$".into(),
                case_insensitive: true,
            }
        );
        assert_eq!(
            compile(json!({"lastName": {"startsWith": "a+"}})).unwrap(),
            Expr::Regex {
                path: "lastName".into(),
                pattern: r"^a\+".into(),
                case_insensitive: false,
            }
        );
    }

    #[test]
    fn test_contains() {
        assert_eq!(
            compile(json!({"tags": {"contains": ["x", "y"]}})).unwrap(),
            Expr::ContainsAll {
                path: "tags".into(),
                values: vec![json!("x"), json!("y")],
            }
        );
        assert_eq!(
            compile(json!({"tags": {"contains": "x"}})).unwrap(),
            Expr::ContainsAll {
                path: "tags".into(),
                values: vec![json!("x")],
            }
        );
    }

    #[test]
    fn test_computed_field_uses_lookup_key() {
        let node_type = user();
        let requested = vec![AggregationField::aliased("n", "tagCount")];
        let resolver = FieldResolver::new(&node_type, &requested);
        let filter = FilterExpr::field("tagCount", FilterOp::GreaterThan, json!(2));
        assert_eq!(
            build_filter_expr(&filter, &node_type, &resolver).unwrap(),
            Expr::compare("n", CompareOp::Gt, json!(2))
        );
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            compile(json!({"nickname": {"eq": "x"}})),
            Err(ConnectionError::UnknownField { .. })
        ));
    }

    #[test_case(json!({"age": {"like": "1%"}}) ; "like on int")]
    #[test_case(json!({"active": {"gt": true}}) ; "gt on boolean")]
    #[test_case(json!({"lastName": {"contains": "a"}}) ; "contains on scalar")]
    #[test_case(json!({"profile": {"eq": {}}}) ; "eq on json")]
    #[test_case(json!({"tags": {"lt": ["a"]}}) ; "lt on list")]
    #[test_case(json!({"age": {"between": [1, 2]}}) ; "unknown operator")]
    fn test_unsupported_operator(filter: Value) {
        assert!(matches!(
            compile(filter),
            Err(ConnectionError::UnsupportedOperator { .. })
        ));
    }

    #[test_case(json!({"age": {"eq": "3"}}) ; "string for int")]
    #[test_case(json!({"age": {"gt": 3.5}}) ; "float for int")]
    #[test_case(json!({"lastName": {"in": "B"}}) ; "in without list")]
    #[test_case(json!({"lastName": {"in": ["B", 1]}}) ; "mixed in list")]
    #[test_case(json!({"tags": {"contains": [1]}}) ; "wrong element type")]
    #[test_case(json!({"lastName": {"like": 5}}) ; "non text pattern")]
    fn test_type_mismatch(filter: Value) {
        assert!(matches!(
            compile(filter),
            Err(ConnectionError::TypeMismatch { .. })
        ));
    }
}
