//! Aggregation field resolution
//!
//! Requested aggregation fields are materialized into the result document
//! under their lookup key (the alias when given, the declared name otherwise).
//! Materializations the filter or order depend on run before the filter, the
//! rest run after the limit so they are only computed for the returned page.
//! A computed field the filter or order reads without requesting it is
//! materialized under a `__`-prefixed key that never reaches the node.

use super::expr::ValueExpr;
use super::stage::Stage;
use crate::builder::AggregationField;
use crate::error::{ConnectionError, ConnectionResult};
use crate::schema::{ComputedField, Field, NodeType};
use std::collections::{BTreeSet, HashMap};

/// A single `$addFields` entry
#[derive(Debug, Clone, PartialEq)]
pub struct Materialization {
    /// Key written into the document
    pub key: String,
    /// Declared field it comes from
    pub source: String,
    pub value: ValueExpr,
}

/// Maps requested aggregation fields to lookup keys and the stages producing them
#[derive(Debug, Clone)]
pub struct FieldResolver<'a> {
    node_type: &'a NodeType,
    requested: &'a [AggregationField],
    materializations: Vec<Materialization>,
    /// Declared computed field -> key the filter and order read it from,
    /// hidden for computed fields nobody requested
    computed_keys: HashMap<&'a str, String>,
}

impl<'a> FieldResolver<'a> {
    /// Build the resolver without validating the request.
    ///
    /// Validation is deferred to [`FieldResolver::validate`] so filter errors
    /// are reported before aggregation errors.
    pub fn new(node_type: &'a NodeType, requested: &'a [AggregationField]) -> Self {
        let mut materializations = Vec::with_capacity(requested.len());
        let mut computed_keys = HashMap::new();

        for request in requested {
            let Some(field) = node_type.field(&request.source_field) else {
                continue;
            };
            let key = resolve(field, request.alias.as_deref());
            if field.is_computed() {
                computed_keys
                    .entry(field.name.as_str())
                    .or_insert_with(|| key.clone());
            } else if key == field.name {
                // a stored field under its own name is already in the document
                continue;
            }
            if materializations
                .iter()
                .any(|m: &Materialization| m.key == key && m.source == field.name)
            {
                continue;
            }
            materializations.push(Materialization {
                value: field_value(field),
                key,
                source: field.name.clone(),
            });
        }

        for field in node_type.fields.iter().filter(|f| f.is_computed()) {
            computed_keys
                .entry(field.name.as_str())
                .or_insert_with(|| hidden_key(&field.name));
        }

        Self {
            node_type,
            requested,
            materializations,
            computed_keys,
        }
    }

    /// Check every requested field and alias
    pub fn validate(&self) -> ConnectionResult<()> {
        let mut claimed: HashMap<String, &str> = HashMap::new();

        for request in self.requested {
            let field = self.node_type.require_field(&request.source_field)?;
            let key = resolve(field, request.alias.as_deref());

            if let Some(alias) = &request.alias {
                if alias.is_empty() {
                    return Err(ConnectionError::invalid_alias(alias, "alias is empty"));
                }
                if alias.starts_with("__") {
                    return Err(ConnectionError::invalid_alias(
                        alias,
                        "the '__' prefix is reserved",
                    ));
                }
                if alias != &field.name && self.node_type.field(alias).is_some() {
                    return Err(ConnectionError::invalid_alias(
                        alias,
                        format!("shadows the declared field {alias}"),
                    ));
                }
            }

            if let Some(source) = claimed.insert(key.clone(), field.name.as_str()) {
                if source != field.name {
                    return Err(ConnectionError::invalid_alias(
                        key,
                        format!("already used for {source}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Key under which the filter and order find `field`
    pub fn lookup_key<'f>(&'f self, field: &'f Field) -> &'f str {
        match self.computed_keys.get(field.name.as_str()) {
            Some(key) if field.is_computed() => key.as_str(),
            _ => field.name.as_str(),
        }
    }

    /// Stage materializing everything `referenced` depends on, run before the filter
    pub fn pre_filter_stage(&self, referenced: &BTreeSet<&str>) -> Option<Stage> {
        let mut entries: Vec<(String, ValueExpr)> = self
            .materializations
            .iter()
            .filter(|m| referenced.contains(m.source.as_str()))
            .map(|m| (m.key.clone(), m.value.clone()))
            .collect();

        // computed fields used by the filter or order but not requested
        for name in referenced {
            let Some(field) = self.node_type.field(name) else {
                continue;
            };
            let requested = self.materializations.iter().any(|m| m.source == field.name);
            if field.is_computed() && !requested {
                entries.push((self.lookup_key(field).to_string(), field_value(field)));
            }
        }

        add_fields(entries)
    }

    /// Stage materializing the rest, run after the limit
    pub fn post_limit_stage(&self, referenced: &BTreeSet<&str>) -> Option<Stage> {
        add_fields(
            self.materializations
                .iter()
                .filter(|m| !referenced.contains(m.source.as_str()))
                .map(|m| (m.key.clone(), m.value.clone()))
                .collect(),
        )
    }

    /// Every materialization, for single-node lookups
    pub fn all_stage(&self) -> Option<Stage> {
        add_fields(
            self.materializations
                .iter()
                .map(|m| (m.key.clone(), m.value.clone()))
                .collect(),
        )
    }

    pub fn materializations(&self) -> &[Materialization] {
        &self.materializations
    }
}

/// The lookup key of a requested field: the alias when given, the declared
/// name otherwise
pub fn resolve(field: &Field, alias: Option<&str>) -> String {
    alias.unwrap_or(&field.name).to_string()
}

/// Bookkeeping key for a computed field read only by the filter or order
fn hidden_key(name: &str) -> String {
    format!("__{name}")
}

fn add_fields(entries: Vec<(String, ValueExpr)>) -> Option<Stage> {
    if entries.is_empty() {
        None
    } else {
        Some(Stage::AddFields(entries))
    }
}

fn field_value(field: &Field) -> ValueExpr {
    match &field.computed {
        None => ValueExpr::field(field.name.as_str()),
        Some(ComputedField::Size(source)) => {
            ValueExpr::Size(Box::new(ValueExpr::field(source.as_str())))
        }
        Some(ComputedField::Concat { fields, separator }) => {
            let mut parts = Vec::with_capacity(fields.len() * 2);
            for (i, source) in fields.iter().enumerate() {
                if i > 0 && !separator.is_empty() {
                    parts.push(ValueExpr::Literal(separator.clone().into()));
                }
                parts.push(ValueExpr::field(source.as_str()));
            }
            ValueExpr::Concat(parts)
        }
        Some(ComputedField::Sum(sources)) => ValueExpr::Add(
            sources
                .iter()
                .map(|s| ValueExpr::field(s.as_str()))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_id::TypeTag;
    use crate::schema::FieldType;

    fn user() -> NodeType {
        NodeType::new("User", "users", TypeTag::new("USR").unwrap())
            .with_field(Field::new("firstName", FieldType::String))
            .with_field(Field::new("lastName", FieldType::String))
            .with_field(Field::new("tags", FieldType::List(Box::new(FieldType::String))))
            .with_field(
                Field::new("tagCount", FieldType::Int).computed(ComputedField::Size("tags".into())),
            )
            .with_field(Field::new("fullName", FieldType::String).computed(
                ComputedField::Concat {
                    fields: vec!["firstName".into(), "lastName".into()],
                    separator: " ".into(),
                },
            ))
    }

    #[test]
    fn test_alias_lookup() {
        let node_type = user();
        let requested = vec![
            AggregationField::aliased("surname", "lastName"),
            AggregationField::aliased("n", "tagCount"),
        ];
        let resolver = FieldResolver::new(&node_type, &requested);
        resolver.validate().unwrap();

        // stored fields are always filtered by their own path
        let last_name = node_type.field("lastName").unwrap();
        assert_eq!(resolver.lookup_key(last_name), "lastName");
        let tag_count = node_type.field("tagCount").unwrap();
        assert_eq!(resolver.lookup_key(tag_count), "n");
        let full_name = node_type.field("fullName").unwrap();
        assert_eq!(resolver.lookup_key(full_name), "__fullName");
    }

    #[test]
    fn test_stage_placement() {
        let node_type = user();
        let requested = vec![
            AggregationField::aliased("surname", "lastName"),
            AggregationField::new("tagCount"),
        ];
        let resolver = FieldResolver::new(&node_type, &requested);
        let referenced: BTreeSet<&str> = ["tagCount", "fullName"].into_iter().collect();

        let pre = resolver.pre_filter_stage(&referenced).unwrap();
        match pre {
            Stage::AddFields(entries) => {
                let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["tagCount", "__fullName"]);
            }
            other => panic!("expected $addFields, got {other:?}"),
        }

        let post = resolver.post_limit_stage(&referenced).unwrap();
        assert_eq!(
            post,
            Stage::AddFields(vec![("surname".into(), ValueExpr::field("lastName"))])
        );
    }

    #[test]
    fn test_identity_request_adds_nothing() {
        let node_type = user();
        let requested = vec![AggregationField::new("lastName")];
        let resolver = FieldResolver::new(&node_type, &requested);
        resolver.validate().unwrap();
        assert!(resolver.all_stage().is_none());
    }

    #[test]
    fn test_invalid_aliases() {
        let node_type = user();
        let cases = vec![
            vec![AggregationField::aliased("__secret", "lastName")],
            vec![AggregationField::aliased("firstName", "lastName")],
            vec![
                AggregationField::aliased("x", "lastName"),
                AggregationField::aliased("x", "firstName"),
            ],
            vec![AggregationField::aliased("", "lastName")],
        ];
        for requested in cases {
            let resolver = FieldResolver::new(&node_type, &requested);
            assert!(
                matches!(resolver.validate(), Err(ConnectionError::InvalidAlias { .. })),
                "{requested:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_source() {
        let node_type = user();
        let requested = vec![AggregationField::new("nickname")];
        let resolver = FieldResolver::new(&node_type, &requested);
        assert!(matches!(
            resolver.validate(),
            Err(ConnectionError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_concat_value() {
        let node_type = user();
        let field = node_type.field("fullName").unwrap();
        assert_eq!(
            field_value(field),
            ValueExpr::Concat(vec![
                ValueExpr::field("firstName"),
                ValueExpr::Literal(" ".into()),
                ValueExpr::field("lastName"),
            ])
        );
    }
}
