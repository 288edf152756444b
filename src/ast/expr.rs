//! Pipeline expression types
//!
//! Two expression families exist in the store's vocabulary:
//!
//! - [`Expr`]: match predicates, evaluated against a document and yielding a boolean
//! - [`ValueExpr`]: computed values, used by `$addFields`
//!
//! Comparisons are type-bracketed: a comparison only matches when the stored
//! value and the literal have the same type. `null` and a missing field are
//! interchangeable.

use serde_json::Value;

/// A dotted path into a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(pub String);

impl FieldPath {
    #[inline]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Read the value at this path; `None` when any segment is missing
    pub fn lookup<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.segments()
            .try_fold(doc, |current, segment| current.as_object()?.get(segment))
    }
}

impl From<String> for FieldPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    /// Native operator name
    pub fn as_native(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
        }
    }
}

/// Match predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant true/false
    Literal(bool),

    /// path <op> value
    Compare {
        path: FieldPath,
        op: CompareOp,
        value: Value,
    },

    /// path IN (values) / NOT IN
    In {
        path: FieldPath,
        values: Vec<Value>,
        negated: bool,
    },

    /// Regular expression match on a text field
    Regex {
        path: FieldPath,
        pattern: String,
        case_insensitive: bool,
    },

    /// IS NULL / IS NOT NULL (missing counts as null)
    IsNull { path: FieldPath, negated: bool },

    /// List field holds every one of `values`
    ContainsAll { path: FieldPath, values: Vec<Value> },

    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn compare(path: impl Into<FieldPath>, op: CompareOp, value: Value) -> Self {
        Self::Compare {
            path: path.into(),
            op,
            value,
        }
    }

    pub fn eq(path: impl Into<FieldPath>, value: Value) -> Self {
        Self::compare(path, CompareOp::Eq, value)
    }

    pub fn is_null(path: impl Into<FieldPath>) -> Self {
        Self::IsNull {
            path: path.into(),
            negated: false,
        }
    }

    pub fn is_not_null(path: impl Into<FieldPath>) -> Self {
        Self::IsNull {
            path: path.into(),
            negated: true,
        }
    }

    pub fn not(expr: Expr) -> Self {
        Self::Not(Box::new(expr))
    }

    /// Combine with AND, flattening nested conjunctions
    pub fn and(self, other: Expr) -> Self {
        combine_with_and(vec![self, other])
    }

    /// Combine with OR, flattening nested disjunctions
    pub fn or(self, other: Expr) -> Self {
        combine_with_or(vec![self, other])
    }
}

/// Combine predicates with AND; an empty list is true
pub fn combine_with_and(conditions: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(conditions.len());
    for cond in conditions {
        match cond {
            Expr::And(inner) => flat.extend(inner),
            Expr::Literal(true) => {}
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => Expr::Literal(true),
        1 => flat.remove(0),
        _ => Expr::And(flat),
    }
}

/// Combine predicates with OR; an empty list is false
pub fn combine_with_or(conditions: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(conditions.len());
    for cond in conditions {
        match cond {
            Expr::Or(inner) => flat.extend(inner),
            Expr::Literal(false) => {}
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => Expr::Literal(false),
        1 => flat.remove(0),
        _ => Expr::Or(flat),
    }
}

/// Computed value expression
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// Value of another field
    Field(FieldPath),
    /// Constant
    Literal(Value),
    /// Byte substring of a text value: (input, start, length)
    Substr {
        input: Box<ValueExpr>,
        start: usize,
        len: usize,
    },
    /// Text concatenation
    Concat(Vec<ValueExpr>),
    /// Length of a list (0 when missing)
    Size(Box<ValueExpr>),
    /// Numeric sum (null operands count as 0)
    Add(Vec<ValueExpr>),
}

impl ValueExpr {
    pub fn field(path: impl Into<FieldPath>) -> Self {
        Self::Field(path.into())
    }

    pub fn substr(input: ValueExpr, start: usize, len: usize) -> Self {
        Self::Substr {
            input: Box::new(input),
            start,
            len,
        }
    }
}
