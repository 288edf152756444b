//! Request resolution against a document store
//!
//! [`Resolver`] ties the compilers, the executor and connection shaping
//! together. Compilation errors surface before anything is sent to the store.

use crate::ast::{CompileContext, ConnectionQuery, NodeQuery, ToPipeline};
use crate::builder::{ConnectionRequest, NodeRequest};
use crate::config::CompilerConfig;
use crate::connection::{shape_node, Connection};
use crate::error::ConnectionResult;
use crate::executor::{execute_plan, log_error, DocumentStore, StepId};
use crate::schema::Schema;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Resolver<S> {
    schema: Arc<Schema>,
    config: CompilerConfig,
    store: S,
}

impl<S: DocumentStore> Resolver<S> {
    pub fn new(schema: Arc<Schema>, config: CompilerConfig, store: S) -> ConnectionResult<Self> {
        config.validate()?;
        Ok(Self {
            schema,
            config,
            store,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn context(&self) -> CompileContext<'_> {
        CompileContext::new(&self.schema, &self.config)
    }

    /// Compile a connection request without executing it
    pub fn compile_connection(&self, request: &ConnectionRequest) -> ConnectionResult<ConnectionQuery> {
        request
            .to_pipeline(&self.context())
            .inspect_err(|e| log_error(self.config.log_level, "compile_connection", e))
    }

    /// Compile a node request without executing it; `None` for a type mismatch
    pub fn compile_node(&self, request: &NodeRequest) -> ConnectionResult<Option<NodeQuery>> {
        request
            .to_pipeline(&self.context())
            .inspect_err(|e| log_error(self.config.log_level, "compile_node", e))
    }

    /// Compile, execute and shape one page of a connection
    pub async fn resolve_connection(
        &self,
        request: &ConnectionRequest,
        cancel: &CancellationToken,
    ) -> ConnectionResult<Connection> {
        let query = self.compile_connection(request)?;
        let results = execute_plan(&self.store, &query.plan, self.config.log_level, cancel).await?;
        Connection::from_rows(&query, results)
            .inspect_err(|e| log_error(self.config.log_level, "resolve_connection", e))
    }

    /// Look up a single node by its global id
    pub async fn resolve_node(
        &self,
        request: &NodeRequest,
        cancel: &CancellationToken,
    ) -> ConnectionResult<Option<Value>> {
        let Some(query) = self.compile_node(request)? else {
            return Ok(None);
        };

        let mut results =
            execute_plan(&self.store, &query.plan, self.config.log_level, cancel).await?;
        Ok(results
            .take(StepId::Node)
            .into_iter()
            .next()
            .map(|row| shape_node(row, &query.node_type.name)))
    }
}
