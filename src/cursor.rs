//! Opaque pagination cursors
//!
//! A cursor is the base64 text of a JSON array holding the ordering-key
//! values of a row, primary key last. It is positional: field names and
//! directions are not part of the token, the active order supplies them.

use crate::error::{ConnectionError, ConnectionResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A decoded cursor: one value per ordering field
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub values: Vec<Value>,
}

impl Cursor {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn encode(&self) -> String {
        encode(&self.values)
    }
}

impl FromStr for Cursor {
    type Err = ConnectionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        decode(input).map(Cursor::new)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Encode an ordering-key tuple
pub fn encode(values: &[Value]) -> String {
    // Serializing a slice of Values cannot fail
    let json = Value::Array(values.to_vec()).to_string();
    STANDARD.encode(json.as_bytes())
}

/// Decode a token produced by [`encode`]
pub fn decode(token: &str) -> ConnectionResult<Vec<Value>> {
    let bytes = STANDARD
        .decode(token.trim())
        .map_err(|_| ConnectionError::invalid_cursor("not base64"))?;

    let text = std::str::from_utf8(&bytes)
        .map_err(|_| ConnectionError::invalid_cursor("not utf-8"))?;

    match serde_json::from_str(text) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(_) => Err(ConnectionError::invalid_cursor("not a key tuple")),
        Err(_) => Err(ConnectionError::invalid_cursor("not json")),
    }
}
