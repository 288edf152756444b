//! Node type definitions
//!
//! The schema is built once from definitions supplied by the schema layer and
//! is read-only afterwards. It is handed to the compiler explicitly.

use crate::error::{ConnectionError, ConnectionResult};
use crate::node_id::TypeTag;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Default primary key field name
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Id,
    String,
    Int,
    Float,
    Boolean,
    DateTime,
    Json,
    List(Box<FieldType>),
}

impl FieldType {
    /// Whether `value` is a well-typed (non-null) literal for this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Id | Self::String | Self::DateTime, Value::String(_)) => true,
            (Self::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, Value::Number(_)) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Json, v) => !v.is_null(),
            (Self::List(inner), Value::Array(items)) => items.iter().all(|i| inner.accepts(i)),
            _ => false,
        }
    }

    pub fn is_orderable(&self) -> bool {
        !matches!(self, Self::Json | Self::List(_))
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Id | Self::String)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    pub fn list_element(&self) -> Option<&FieldType> {
        match self {
            Self::List(inner) => Some(inner),
            _ => None,
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = ConnectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for FieldType {
    type Err = ConnectionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Some(inner) = input.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return Ok(Self::List(Box::new(inner.parse()?)));
        }
        match input {
            "ID" => Ok(Self::Id),
            "String" => Ok(Self::String),
            "Int" => Ok(Self::Int),
            "Float" => Ok(Self::Float),
            "Boolean" => Ok(Self::Boolean),
            "DateTime" => Ok(Self::DateTime),
            "JSON" => Ok(Self::Json),
            other => Err(ConnectionError::schema(format!("unknown field type {other}"))),
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => f.write_str("ID"),
            Self::String => f.write_str("String"),
            Self::Int => f.write_str("Int"),
            Self::Float => f.write_str("Float"),
            Self::Boolean => f.write_str("Boolean"),
            Self::DateTime => f.write_str("DateTime"),
            Self::Json => f.write_str("JSON"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// A field whose value is computed by the pipeline from stored fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComputedField {
    /// Length of a list field
    Size(String),
    /// Stored text fields joined with a separator
    Concat {
        fields: Vec<String>,
        #[serde(default)]
        separator: String,
    },
    /// Sum of numeric fields
    Sum(Vec<String>),
}

impl ComputedField {
    pub fn sources(&self) -> Vec<&str> {
        match self {
            Self::Size(field) => vec![field.as_str()],
            Self::Concat { fields, .. } | Self::Sum(fields) => {
                fields.iter().map(String::as_str).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<ComputedField>,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            computed: None,
        }
    }

    pub fn non_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn computed(mut self, computed: ComputedField) -> Self {
        self.computed = Some(computed);
        self
    }

    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    /// Whether `value` may be stored in (or compared against) this field
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.nullable;
        }
        self.field_type.accepts(value)
    }
}

/// Schema-level kind of a named entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Type,
    Interface,
    Union,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Interface => "interface",
            Self::Union => "union",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeType {
    pub name: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub type_tag: Option<TypeTag>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Interfaces a `type` implements
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Members of a `union`
    #[serde(default)]
    pub possible_types: Vec<String>,
}

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

impl NodeType {
    /// A storable type backed by `collection`
    pub fn new(name: impl Into<String>, collection: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Type,
            collection: Some(collection.into()),
            type_tag: Some(tag),
            primary_key: default_primary_key(),
            fields: vec![Field::new(DEFAULT_PRIMARY_KEY, FieldType::Id).non_null()],
            interfaces: vec![],
            possible_types: vec![],
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Interface,
            collection: None,
            type_tag: None,
            primary_key: default_primary_key(),
            fields: vec![],
            interfaces: vec![],
            possible_types: vec![],
        }
    }

    pub fn union(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            possible_types: members,
            kind: NodeKind::Union,
            ..Self::interface(name)
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn implementing(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field or fail with `UnknownField`
    pub fn require_field(&self, name: &str) -> ConnectionResult<&Field> {
        self.field(name)
            .ok_or_else(|| ConnectionError::unknown_field(name, &self.name))
    }

    pub fn primary_key_field(&self) -> ConnectionResult<&Field> {
        self.require_field(&self.primary_key)
    }

    pub fn collection_name(&self) -> ConnectionResult<&str> {
        self.collection
            .as_deref()
            .ok_or_else(|| ConnectionError::invalid_node_type(&self.name, "no collection"))
    }

    pub fn is_storable(&self) -> bool {
        self.kind == NodeKind::Type && self.collection.is_some() && self.type_tag.is_some()
    }
}

/// Wrapper used when loading a schema from JSON
#[derive(Debug, Clone, Deserialize)]
struct SchemaDefinition {
    types: Vec<NodeType>,
}

/// Immutable registry of node types
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: HashMap<String, Arc<NodeType>>,
    by_tag: HashMap<TypeTag, String>,
    /// Number of storable types per collection
    collection_members: HashMap<String, usize>,
}

impl Schema {
    pub fn new(types: Vec<NodeType>) -> ConnectionResult<Self> {
        let mut schema = Self::default();

        for node_type in types {
            if schema.types.contains_key(&node_type.name) {
                return Err(ConnectionError::schema(format!(
                    "type {} is defined twice",
                    node_type.name
                )));
            }
            if node_type.kind == NodeKind::Type {
                let tag = node_type.type_tag.clone().ok_or_else(|| {
                    ConnectionError::schema(format!("type {} has no type tag", node_type.name))
                })?;
                if let Some(other) = schema.by_tag.insert(tag.clone(), node_type.name.clone()) {
                    return Err(ConnectionError::schema(format!(
                        "type tag {tag} is used by both {other} and {}",
                        node_type.name
                    )));
                }
                let collection = node_type.collection.clone().ok_or_else(|| {
                    ConnectionError::schema(format!("type {} has no collection", node_type.name))
                })?;
                *schema.collection_members.entry(collection).or_default() += 1;
            }
            schema
                .types
                .insert(node_type.name.clone(), Arc::new(node_type));
        }

        for node_type in schema.types.values() {
            schema.validate_type(node_type)?;
        }

        Ok(schema)
    }

    pub fn from_json(input: &str) -> ConnectionResult<Self> {
        let definition: SchemaDefinition = serde_json::from_str(input)
            .map_err(|e| ConnectionError::schema(format!("invalid schema document: {e}")))?;
        Self::new(definition.types)
    }

    fn validate_type(&self, node_type: &NodeType) -> ConnectionResult<()> {
        let mut seen = HashSet::new();
        for field in &node_type.fields {
            if field.name.starts_with("__") {
                return Err(ConnectionError::schema(format!(
                    "field {}.{} uses the reserved '__' prefix",
                    node_type.name, field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ConnectionError::schema(format!(
                    "field {}.{} is declared twice",
                    node_type.name, field.name
                )));
            }
            if let Some(computed) = &field.computed {
                validate_computed(node_type, field, computed)?;
            }
        }

        match node_type.kind {
            NodeKind::Type => {
                let pk = node_type.primary_key_field().map_err(|_| {
                    ConnectionError::schema(format!(
                        "primary key {} is not declared on {}",
                        node_type.primary_key, node_type.name
                    ))
                })?;
                if pk.field_type != FieldType::Id || pk.nullable || pk.is_computed() {
                    return Err(ConnectionError::schema(format!(
                        "primary key {}.{} must be a stored non-null ID",
                        node_type.name, pk.name
                    )));
                }
                for interface in &node_type.interfaces {
                    self.expect_kind(interface, NodeKind::Interface)?;
                }
            }
            NodeKind::Union => {
                for member in &node_type.possible_types {
                    self.expect_kind(member, NodeKind::Type)?;
                }
            }
            NodeKind::Interface => {}
        }
        Ok(())
    }

    fn expect_kind(&self, name: &str, kind: NodeKind) -> ConnectionResult<()> {
        match self.types.get(name) {
            Some(t) if t.kind == kind => Ok(()),
            Some(t) => Err(ConnectionError::schema(format!(
                "{name} is a {}, expected a {}",
                t.kind.as_str(),
                kind.as_str()
            ))),
            None => Err(ConnectionError::schema(format!("{name} is not defined"))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<NodeType>> {
        self.types.get(name)
    }

    /// Resolve a connection target: it must be a defined, storable `type`
    pub fn storable(&self, name: &str) -> ConnectionResult<&Arc<NodeType>> {
        let node_type = self
            .get(name)
            .ok_or_else(|| ConnectionError::invalid_node_type(name, "not defined"))?;
        if node_type.kind != NodeKind::Type {
            return Err(ConnectionError::invalid_node_type(
                name,
                format!("a {} cannot back a connection", node_type.kind.as_str()),
            ));
        }
        Ok(node_type)
    }

    pub fn by_tag(&self, tag: &TypeTag) -> Option<&Arc<NodeType>> {
        self.by_tag.get(tag).and_then(|name| self.types.get(name))
    }

    /// Whether documents of other types live in the same collection
    pub fn shares_collection(&self, node_type: &NodeType) -> bool {
        node_type
            .collection
            .as_ref()
            .and_then(|c| self.collection_members.get(c))
            .is_some_and(|count| *count > 1)
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<NodeType>> {
        self.types.values()
    }
}

fn validate_computed(
    node_type: &NodeType,
    field: &Field,
    computed: &ComputedField,
) -> ConnectionResult<()> {
    for source in computed.sources() {
        let source_field = node_type.field(source).ok_or_else(|| {
            ConnectionError::schema(format!(
                "computed field {}.{} references undeclared {source}",
                node_type.name, field.name
            ))
        })?;
        if source_field.is_computed() {
            return Err(ConnectionError::schema(format!(
                "computed field {}.{} may only reference stored fields",
                node_type.name, field.name
            )));
        }
        let ok = match computed {
            ComputedField::Size(_) => source_field.field_type.list_element().is_some(),
            ComputedField::Concat { .. } => source_field.field_type.is_textual(),
            ComputedField::Sum(_) => source_field.field_type.is_numeric(),
        };
        if !ok {
            return Err(ConnectionError::schema(format!(
                "computed field {}.{} cannot use {source} of type {}",
                node_type.name, field.name, source_field.field_type
            )));
        }
    }

    // the result type follows from the expression, not from the declaration
    let declared_ok = match computed {
        ComputedField::Size(_) => field.field_type == FieldType::Int,
        ComputedField::Concat { .. } => field.field_type == FieldType::String,
        ComputedField::Sum(sources) => match field.field_type {
            FieldType::Float => true,
            FieldType::Int => sources.iter().all(|source| {
                node_type
                    .field(source)
                    .is_some_and(|f| f.field_type == FieldType::Int)
            }),
            _ => false,
        },
    };
    if !declared_ok {
        return Err(ConnectionError::schema(format!(
            "computed field {}.{} cannot be declared {}",
            node_type.name, field.name, field.field_type
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tag(s: &str) -> TypeTag {
        TypeTag::new(s).unwrap()
    }

    #[test]
    fn test_field_type_parsing() {
        assert_eq!("Int".parse::<FieldType>().unwrap(), FieldType::Int);
        assert_eq!(
            "[String]".parse::<FieldType>().unwrap(),
            FieldType::List(Box::new(FieldType::String))
        );
        assert!("Decimal".parse::<FieldType>().is_err());
        assert_eq!(FieldType::List(Box::new(FieldType::Int)).to_string(), "[Int]");
    }

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::Int.accepts(&json!(3)));
        assert!(!FieldType::Int.accepts(&json!(3.5)));
        assert!(FieldType::Float.accepts(&json!(3)));
        assert!(!FieldType::String.accepts(&json!(1)));
        assert!(FieldType::List(Box::new(FieldType::String)).accepts(&json!(["a", "b"])));
        assert!(!FieldType::List(Box::new(FieldType::String)).accepts(&json!(["a", 1])));
        assert!(!FieldType::Boolean.accepts(&Value::Null));
    }

    #[test]
    fn test_storable_lookup() {
        let schema = Schema::new(vec![
            NodeType::interface("Node"),
            NodeType::new("User", "users", tag("USR")).implementing("Node"),
        ])
        .unwrap();

        assert!(schema.storable("User").is_ok());
        assert!(matches!(
            schema.storable("Node"),
            Err(ConnectionError::InvalidNodeType { .. })
        ));
        assert!(matches!(
            schema.storable("Missing"),
            Err(ConnectionError::InvalidNodeType { .. })
        ));
        assert_eq!(schema.by_tag(&tag("USR")).unwrap().name, "User");
    }

    #[test]
    fn test_shared_collections() {
        let schema = Schema::new(vec![
            NodeType::new("Cat", "animals", tag("CAT")),
            NodeType::new("Dog", "animals", tag("DOG")),
            NodeType::new("User", "users", tag("USR")),
        ])
        .unwrap();

        assert!(schema.shares_collection(schema.get("Cat").unwrap()));
        assert!(!schema.shares_collection(schema.get("User").unwrap()));
    }

    #[test]
    fn test_rejects_duplicate_tags() {
        let err = Schema::new(vec![
            NodeType::new("A", "a", tag("AAA")),
            NodeType::new("B", "b", tag("AAA")),
        ])
        .unwrap_err();
        assert!(matches!(err, ConnectionError::Schema(_)));
    }

    #[test]
    fn test_rejects_bad_computed_field() {
        let err = Schema::new(vec![NodeType::new("User", "users", tag("USR"))
            .with_field(Field::new("age", FieldType::Int))
            .with_field(
                Field::new("ageLength", FieldType::Int)
                    .computed(ComputedField::Size("age".into())),
            )])
        .unwrap_err();
        assert!(matches!(err, ConnectionError::Schema(_)));

        let declared_as = |field_type: FieldType, computed: ComputedField| {
            Schema::new(vec![NodeType::new("User", "users", tag("USR"))
                .with_field(Field::new("age", FieldType::Int))
                .with_field(Field::new("score", FieldType::Float))
                .with_field(Field::new("nickname", FieldType::String))
                .with_field(Field::new("tags", FieldType::List(Box::new(FieldType::String))))
                .with_field(Field::new("derived", field_type).computed(computed))])
        };

        assert!(declared_as(FieldType::String, ComputedField::Size("tags".into())).is_err());
        assert!(declared_as(
            FieldType::Int,
            ComputedField::Concat {
                fields: vec!["nickname".into()],
                separator: " ".into(),
            }
        )
        .is_err());
        // a float source can produce a fraction
        assert!(declared_as(
            FieldType::Int,
            ComputedField::Sum(vec!["age".into(), "score".into()])
        )
        .is_err());
        assert!(declared_as(
            FieldType::Float,
            ComputedField::Sum(vec!["age".into(), "score".into()])
        )
        .is_ok());
        assert!(declared_as(FieldType::Int, ComputedField::Sum(vec!["age".into(), "age".into()])).is_ok());
        assert!(declared_as(FieldType::Int, ComputedField::Size("tags".into())).is_ok());
    }

    #[test]
    fn test_from_json() {
        let schema = Schema::from_json(
            r#"{
                "types": [
                    {"name": "Node", "kind": "interface"},
                    {
                        "name": "User",
                        "collection": "users",
                        "typeTag": "USR",
                        "interfaces": ["Node"],
                        "fields": [
                            {"name": "id", "type": "ID", "nullable": false},
                            {"name": "tags", "type": "[String]"},
                            {"name": "tagCount", "type": "Int", "computed": {"size": "tags"}}
                        ]
                    },
                    {"name": "SearchResult", "kind": "union", "possibleTypes": ["User"]}
                ]
            }"#,
        )
        .unwrap();

        let user = schema.storable("User").unwrap();
        assert_eq!(user.field("tagCount").unwrap().computed, Some(ComputedField::Size("tags".into())));
        assert_eq!(schema.get("SearchResult").unwrap().kind, NodeKind::Union);
    }
}
