//! Global node identity
//!
//! Primary keys carry their node type so a key can be routed to its type
//! without a separate lookup. The layout is versioned:
//!
//! ```text
//! 1 USR 42
//! │ │   └── local id (any non-empty text)
//! │ └────── type tag, TYPE_TAG_WIDTH ascii alphanumerics
//! └──────── encoding version
//! ```

use crate::error::{ConnectionError, ConnectionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current key encoding version
pub const NODE_ID_VERSION: char = '1';

/// Width of the type tag segment
pub const TYPE_TAG_WIDTH: usize = 3;

/// Byte offset of the type tag inside an encoded key
pub const TYPE_TAG_OFFSET: usize = 1;

/// Fixed-width node type discriminator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(tag: impl Into<String>) -> ConnectionResult<Self> {
        let tag = tag.into();
        if tag.len() != TYPE_TAG_WIDTH || !tag.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ConnectionError::schema(format!(
                "type tag '{tag}' must be {TYPE_TAG_WIDTH} ascii alphanumeric characters"
            )));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TypeTag {
    type Error = ConnectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub tag: TypeTag,
    pub local_id: String,
}

impl NodeId {
    pub fn new(tag: TypeTag, local_id: impl Into<String>) -> Self {
        Self {
            tag,
            local_id: local_id.into(),
        }
    }

    /// Render the key in the current encoding version
    pub fn encode(&self) -> String {
        encode(&self.tag, &self.local_id)
    }
}

impl FromStr for NodeId {
    type Err = ConnectionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        decode(input)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// key = version + tag + local id
pub fn encode(tag: &TypeTag, local_id: &str) -> String {
    let mut key = String::with_capacity(1 + TYPE_TAG_WIDTH + local_id.len());
    key.push(NODE_ID_VERSION);
    key.push_str(tag.as_str());
    key.push_str(local_id);
    key
}

/// Split a key into its tag and local id
pub fn decode(key: &str) -> ConnectionResult<NodeId> {
    let tag = decode_type(key)?;
    let local_id = &key[TYPE_TAG_OFFSET + TYPE_TAG_WIDTH..];
    if local_id.is_empty() {
        return Err(ConnectionError::invalid_node_id(format!(
            "'{key}' has no local id"
        )));
    }
    Ok(NodeId::new(tag, local_id))
}

/// Recover the type tag from a key without knowing its type
pub fn decode_type(key: &str) -> ConnectionResult<TypeTag> {
    match key.chars().next() {
        Some(NODE_ID_VERSION) => {}
        Some(other) => {
            return Err(ConnectionError::invalid_node_id(format!(
                "unsupported key version '{other}'"
            )))
        }
        None => return Err(ConnectionError::invalid_node_id("empty key")),
    }

    let tag = key
        .get(TYPE_TAG_OFFSET..TYPE_TAG_OFFSET + TYPE_TAG_WIDTH)
        .ok_or_else(|| ConnectionError::invalid_node_id(format!("'{key}' is too short")))?;

    TypeTag::new(tag)
        .map_err(|_| ConnectionError::invalid_node_id(format!("'{key}' has a malformed type tag")))
}
