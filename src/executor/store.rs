//! Store seam and plan execution
//!
//! Every step of a plan is sent to the store at once. The whole plan is
//! raced against the caller's cancellation token; a cancelled or failed plan
//! produces no partial result.

use super::telemetry::{log_pipeline, log_plan, log_rows, ExecutionTimer, LogLevel};
use super::{ExecutionPlan, StepId};
use crate::ast::Pipeline;
use crate::error::{ConnectionError, ConnectionResult};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A document store able to run aggregation pipelines
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run `pipeline` against `pipeline.collection` and return the output documents
    async fn aggregate(&self, pipeline: &Pipeline) -> ConnectionResult<Vec<Value>>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn aggregate(&self, pipeline: &Pipeline) -> ConnectionResult<Vec<Value>> {
        (**self).aggregate(pipeline).await
    }
}

/// Rows returned per step
#[derive(Debug, Default)]
pub struct StepResults {
    rows: HashMap<StepId, Vec<Value>>,
}

impl StepResults {
    /// Take the rows of a step; empty when the plan had no such step
    pub fn take(&mut self, id: StepId) -> Vec<Value> {
        self.rows.remove(&id).unwrap_or_default()
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.rows.contains_key(&id)
    }
}

/// Run every step of `plan` concurrently
pub async fn execute_plan<S: DocumentStore + ?Sized>(
    store: &S,
    plan: &ExecutionPlan,
    level: LogLevel,
    cancel: &CancellationToken,
) -> ConnectionResult<StepResults> {
    log_plan(level, plan);
    let timer = ExecutionTimer::new(level, "execute_plan");

    let fetches = plan.steps.iter().map(|step| async move {
        log_pipeline(level, step);
        let rows = store.aggregate(&step.pipeline).await?;
        log_rows(level, step, &rows);
        Ok::<_, ConnectionError>((step.id, rows))
    });

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConnectionError::Cancelled),
        result = try_join_all(fetches) => result,
    };

    match result {
        Ok(rows) => {
            timer.success();
            Ok(StepResults {
                rows: rows.into_iter().collect(),
            })
        }
        Err(e) => {
            timer.failure(&e);
            Err(e)
        }
    }
}
