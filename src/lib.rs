//! Relay-style GraphQL connections over a document store
//!
//! A [`ConnectionRequest`] (filter, order, `first`/`after` or
//! `last`/`before`, aggregation fields) is compiled against an immutable
//! [`Schema`] into an [`executor::ExecutionPlan`] of aggregation pipelines.
//! The plan is run on a [`DocumentStore`] and the rows are shaped into a
//! [`Connection`] with opaque cursors.
//!
//! ```rust,ignore
//! let resolver = Resolver::new(schema, CompilerConfig::from_env()?, store)?;
//! let request = ConnectionRequest::new("User")
//!     .with_order(OrderSpec::new(vec![OrderElem::asc("lastName")]))
//!     .first(10);
//! let page = resolver.resolve_connection(&request, &CancellationToken::new()).await?;
//! ```

pub mod ast;
pub mod builder;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod node_id;
pub mod resolve;
pub mod schema;

pub use builder::{
    AggregationField, ConnectionRequest, FilterExpr, FilterOp, NodeRequest, OrderDirection,
    OrderElem, OrderSpec,
};
pub use config::CompilerConfig;
pub use connection::{Connection, Edge, PageInfo};
pub use error::{ConnectionError, ConnectionResult};
pub use executor::{DocumentStore, LogLevel, MemoryStore};
pub use resolve::Resolver;
pub use schema::{ComputedField, Field, FieldType, NodeKind, NodeType, Schema};
