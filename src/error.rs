use thiserror::Error;

/// Central error type for connection compilation and execution.
///
/// Every variant except [`ConnectionError::ExecutionFailure`] describes a
/// request-shape or schema problem and is permanent for that request.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A filter, order or aggregation field references an undeclared field
    #[error("Field not found: {field} on type {type_name}")]
    UnknownField { field: String, type_name: String },

    /// A literal (or cursor value) disagrees with the declared field type
    #[error("Type mismatch on {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Filter operator outside the supported set, or not valid for the field type
    #[error("Unsupported operator '{op}' on field {field}")]
    UnsupportedOperator { op: String, field: String },

    /// Malformed, tampered or order-incompatible cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Conflicting or out-of-range first/last/after/before arguments
    #[error("Invalid pagination arguments: {0}")]
    InvalidPaginationArgs(String),

    /// The target type is undefined or cannot back a connection
    #[error("Invalid node type {type_name}: {reason}")]
    InvalidNodeType { type_name: String, reason: String },

    /// A global node id that does not decode
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    /// An aggregation-field alias that would shadow another key
    #[error("Invalid alias '{alias}': {reason}")]
    InvalidAlias { alias: String, reason: String },

    /// Schema definitions that fail validation
    #[error("Schema error: {0}")]
    Schema(String),

    /// Bad configuration values
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The store round trip failed
    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    /// The caller cancelled the request before the store answered
    #[error("Request cancelled")]
    Cancelled,
}

impl ConnectionError {
    /// Creates an unknown field error
    pub fn unknown_field(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a type mismatch error
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates an unsupported operator error
    pub fn unsupported_operator(op: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            op: op.into(),
            field: field.into(),
        }
    }

    pub fn invalid_cursor(message: impl Into<String>) -> Self {
        Self::InvalidCursor(message.into())
    }

    pub fn invalid_pagination(message: impl Into<String>) -> Self {
        Self::InvalidPaginationArgs(message.into())
    }

    pub fn invalid_node_type(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeType {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_node_id(message: impl Into<String>) -> Self {
        Self::InvalidNodeId(message.into())
    }

    pub fn invalid_alias(alias: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAlias {
            alias: alias.into(),
            reason: reason.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a store execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionFailure(message.into())
    }

    /// Only store failures may be retried without changing the request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExecutionFailure(_))
    }

    /// Stable machine-readable code for structured error responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownField { .. } => "UNKNOWN_FIELD",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            Self::InvalidCursor(_) => "INVALID_CURSOR",
            Self::InvalidPaginationArgs(_) => "INVALID_PAGINATION_ARGS",
            Self::InvalidNodeType { .. } => "INVALID_NODE_TYPE",
            Self::InvalidNodeId(_) => "INVALID_NODE_ID",
            Self::InvalidAlias { .. } => "INVALID_ALIAS",
            Self::Schema(_) => "SCHEMA_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ExecutionFailure(_) => "EXECUTION_FAILURE",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Type alias for Results that use ConnectionError
pub type ConnectionResult<T> = Result<T, ConnectionError>;
