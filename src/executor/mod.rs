//! Execution module for doc_graphql
//!
//! This module runs compiled pipelines against a document store. It
//! provides:
//!
//! - Execution plans holding one or more independent pipelines
//! - The [`DocumentStore`] seam and concurrent plan execution
//! - An in-memory store that evaluates pipelines directly
//! - Telemetry and logging for debugging
//!
//! # Architecture
//!
//! ```text
//! ExecutionPlan
//!   └── ExecutionStep[]
//!         ├── id: StepId (records, total_count, beyond_cursor, node)
//!         └── pipeline: Pipeline (AST)
//! ```
//!
//! Steps share nothing, so they are all sent to the store at once.

mod memory;
mod plan;
mod store;
mod telemetry;

pub use memory::*;
pub use plan::*;
pub use store::*;
pub use telemetry::*;
