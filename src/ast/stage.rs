//! Pipeline and stage types
//!
//! A [`Pipeline`] is an ordered list of stages run against one collection.

use super::expr::{Expr, FieldPath, ValueExpr};
use crate::builder::OrderDirection;

/// An aggregation pipeline against a single collection
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub collection: String,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn extend(&mut self, stages: impl IntoIterator<Item = Stage>) {
        self.stages.extend(stages);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// One key of a `$sort` stage
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub path: FieldPath,
    pub direction: OrderDirection,
}

impl SortKey {
    pub fn new(path: impl Into<FieldPath>, direction: OrderDirection) -> Self {
        Self {
            path: path.into(),
            direction,
        }
    }

    pub fn reverse(&self) -> Self {
        Self {
            path: self.path.clone(),
            direction: self.direction.reverse(),
        }
    }
}

/// Pipeline stages in the store's native vocabulary
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents matching the predicate
    Match(Expr),
    /// Add (or overwrite) computed fields, in order
    AddFields(Vec<(String, ValueExpr)>),
    /// Order documents; earlier keys are more significant
    Sort(Vec<SortKey>),
    /// Keep at most n documents
    Limit(u64),
    /// Replace the stream with `{<field>: count}` (no document when zero)
    Count(String),
}

impl Stage {
    /// Native stage name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::AddFields(_) => "$addFields",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
            Self::Count(_) => "$count",
        }
    }
}
