//! Telemetry and logging for pipeline execution
//!
//! Events are emitted through `tracing`; the configured [`LogLevel`] decides
//! how much is emitted before the subscriber's own filtering applies.
//!
//! # Configuration
//!
//! Set the `DOC_GRAPHQL_LOG_LEVEL` environment variable (or
//! `CompilerConfig::log_level`) to one of:
//! - `off` - No logging (default)
//! - `basic` - Plan summary and timing only
//! - `detailed` - Plus every rendered pipeline and row counts
//! - `debug` - Plus the raw rows returned by the store
//!
//! # Example
//!
//! ```bash
//! export DOC_GRAPHQL_LOG_LEVEL=detailed
//! ```

use super::{ExecutionPlan, ExecutionStep};
use crate::ast::render_text;
use crate::error::ConnectionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Instant;

/// Environment variable holding the log level
pub const LOG_LEVEL_ENV: &str = "DOC_GRAPHQL_LOG_LEVEL";

/// Longest pipeline text logged below `Debug`
const MAX_PIPELINE_LOG_LEN: usize = 1000;

/// Log level for execution telemetry
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No logging
    #[default]
    Off = 0,
    /// Basic info: plan summary and timing
    Basic = 1,
    /// Detailed: rendered pipelines and row counts
    Detailed = 2,
    /// Debug: everything including raw rows
    Debug = 3,
}

impl FromStr for LogLevel {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "" => Ok(Self::Off),
            "basic" => Ok(Self::Basic),
            "detailed" => Ok(Self::Detailed),
            "debug" => Ok(Self::Debug),
            other => Err(ConnectionError::configuration(format!(
                "unknown log level '{other}'"
            ))),
        }
    }
}

/// Log an execution plan
pub fn log_plan(level: LogLevel, plan: &ExecutionPlan) {
    if level < LogLevel::Basic {
        return;
    }

    tracing::info!(
        steps = plan.steps.len(),
        node_type = plan.telemetry.node_type.as_deref().unwrap_or("-"),
        elapsed_ms = plan.telemetry.elapsed_ms() as u64,
        "doc_graphql: execution plan"
    );

    if level >= LogLevel::Detailed {
        for (key, value) in &plan.telemetry.tags {
            tracing::info!(tag = %key, value = %value, "doc_graphql: plan tag");
        }
    }
}

/// Log a pipeline about to be sent to the store
pub fn log_pipeline(level: LogLevel, step: &ExecutionStep) {
    if level < LogLevel::Detailed {
        return;
    }

    let text = render_text(&step.pipeline);
    let text = if level < LogLevel::Debug && text.len() > MAX_PIPELINE_LOG_LEN {
        let mut cut = MAX_PIPELINE_LOG_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &text[..cut])
    } else {
        text
    };

    tracing::info!(
        step = %step.id,
        collection = %step.pipeline.collection,
        description = %step.description,
        "doc_graphql: pipeline {}",
        text
    );
}

/// Log the rows a step returned
pub fn log_rows(level: LogLevel, step: &ExecutionStep, rows: &[Value]) {
    if level < LogLevel::Detailed {
        return;
    }

    tracing::info!(step = %step.id, rows = rows.len(), "doc_graphql: step returned");

    if level >= LogLevel::Debug {
        for row in rows {
            tracing::debug!(step = %step.id, "doc_graphql: row {}", row);
        }
    }
}

/// Log execution result
pub fn log_result(level: LogLevel, start: Instant, success: bool) {
    if level < LogLevel::Basic {
        return;
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = if success { "completed" } else { "failed" };

    tracing::info!(duration_ms, "doc_graphql: execution {}", status);
}

/// Log an error
pub fn log_error(level: LogLevel, context: &str, error: &ConnectionError) {
    if level < LogLevel::Basic {
        return;
    }

    tracing::warn!(code = error.code(), "doc_graphql: error in {}: {}", context, error);
}

/// A guard that logs execution timing on drop
pub struct ExecutionTimer {
    level: LogLevel,
    start: Instant,
    context: String,
    logged: bool,
}

impl ExecutionTimer {
    /// Start a new execution timer
    pub fn new(level: LogLevel, context: impl Into<String>) -> Self {
        Self {
            level,
            start: Instant::now(),
            context: context.into(),
            logged: false,
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    /// Mark as successful and log
    pub fn success(mut self) {
        self.logged = true;
        log_result(self.level, self.start, true);
    }

    /// Mark as failed and log
    pub fn failure(mut self, error: &ConnectionError) {
        self.logged = true;
        log_error(self.level, &self.context, error);
        log_result(self.level, self.start, false);
    }
}

impl Drop for ExecutionTimer {
    fn drop(&mut self) {
        // dropped mid-flight, e.g. the request future was abandoned
        if !self.logged {
            log_result(self.level, self.start, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Pipeline, Stage};
    use crate::executor::StepId;
    use tracing_test::traced_test;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert_eq!("basic".parse::<LogLevel>().unwrap(), LogLevel::Basic);
        assert_eq!("detailed".parse::<LogLevel>().unwrap(), LogLevel::Detailed);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("BASIC".parse::<LogLevel>().unwrap(), LogLevel::Basic);
        assert!(matches!(
            "invalid".parse::<LogLevel>(),
            Err(ConnectionError::Configuration(_))
        ));
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Basic);
        assert!(LogLevel::Basic < LogLevel::Detailed);
        assert!(LogLevel::Detailed < LogLevel::Debug);
    }

    #[test]
    fn test_execution_timer() {
        let timer = ExecutionTimer::new(LogLevel::Off, "test");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10);
    }

    fn step() -> ExecutionStep {
        ExecutionStep::new(
            StepId::Records,
            Pipeline::new("users").with_stage(Stage::Limit(3)),
            "page",
        )
    }

    #[traced_test]
    #[test]
    fn test_detailed_logs_pipeline() {
        log_pipeline(LogLevel::Detailed, &step());
        assert!(logs_contain(r#"[{"$limit":3}]"#));
    }

    #[traced_test]
    #[test]
    fn test_off_logs_nothing() {
        log_pipeline(LogLevel::Off, &step());
        log_error(LogLevel::Off, "test", &ConnectionError::Cancelled);
        assert!(!logs_contain("doc_graphql"));
    }

    #[traced_test]
    #[test]
    fn test_failure_logs_code() {
        ExecutionTimer::new(LogLevel::Basic, "resolve").failure(&ConnectionError::Cancelled);
        assert!(logs_contain("CANCELLED"));
        assert!(logs_contain("execution failed"));
    }
}
