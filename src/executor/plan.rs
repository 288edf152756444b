//! Execution plans for store pipelines
//!
//! A connection request compiles to up to three independent pipelines: the
//! page itself, the total count and the check for rows beyond the cursor.
//! A node lookup compiles to one. Steps never depend on each other, so the
//! executor runs them all at once.

use crate::ast::Pipeline;
use std::fmt;
use std::time::Instant;

/// What a step produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    /// The page rows, one more than requested
    Records,
    /// A single `{totalCount: n}` row (no row when zero)
    TotalCount,
    /// At most one row at or beyond the cursor on the far side
    BeyondCursor,
    /// A single node looked up by id
    Node,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::TotalCount => "total_count",
            Self::BeyondCursor => "beyond_cursor",
            Self::Node => "node",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An execution plan containing one or more pipelines
#[derive(Debug)]
pub struct ExecutionPlan {
    pub steps: Vec<ExecutionStep>,
    /// Telemetry information for debugging
    pub telemetry: PlanTelemetry,
}

/// A single pipeline in an execution plan
#[derive(Debug, Clone)]
pub struct ExecutionStep {
    pub id: StepId,
    pub pipeline: Pipeline,
    /// Human-readable description of what this step does
    pub description: String,
}

impl ExecutionStep {
    pub fn new(id: StepId, pipeline: Pipeline, description: impl Into<String>) -> Self {
        Self {
            id,
            pipeline,
            description: description.into(),
        }
    }
}

/// Telemetry information attached to an execution plan
#[derive(Debug, Clone)]
pub struct PlanTelemetry {
    /// The node type the plan reads
    pub node_type: Option<String>,
    /// When the plan was created
    pub created_at: Instant,
    /// Custom tags for categorization
    pub tags: Vec<(String, String)>,
}

impl Default for PlanTelemetry {
    fn default() -> Self {
        Self {
            node_type: None,
            created_at: Instant::now(),
            tags: Vec::new(),
        }
    }
}

impl PlanTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_type(mut self, name: impl Into<String>) -> Self {
        self.node_type = Some(name.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Get elapsed time since plan creation
    pub fn elapsed_ms(&self) -> u128 {
        self.created_at.elapsed().as_millis()
    }
}

impl ExecutionPlan {
    /// Create a single-step execution plan
    pub fn single(id: StepId, pipeline: Pipeline, description: impl Into<String>) -> Self {
        Self::multi(vec![ExecutionStep::new(id, pipeline, description)])
    }

    pub fn multi(steps: Vec<ExecutionStep>) -> Self {
        Self {
            steps,
            telemetry: PlanTelemetry::default(),
        }
    }

    /// Attach telemetry to the plan
    pub fn with_telemetry(mut self, telemetry: PlanTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Add a tag to the plan's telemetry
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.telemetry.tags.push((key.into(), value.into()));
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get a step by ID
    pub fn get_step(&self, id: StepId) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}
