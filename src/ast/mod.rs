//! Pipeline Abstract Syntax Tree (AST) module
//!
//! This module provides a typed representation of aggregation pipelines that
//! is built programmatically and rendered to the store's JSON vocabulary. It
//! is decoupled from any store client, so compilation can be tested without
//! a database.
//!
//! # Architecture
//!
//! - [`expr`]: match predicates and computed values
//! - [`stage`]: pipelines and their stages
//! - [`render`]: native JSON generation
//! - `transpile_*`: request compilers (filter, order, aggregation fields,
//!   connection, node)
//!
//! # Example
//!
//! ```rust,ignore
//! use doc_graphql::ast::*;
//!
//! let pipeline = Pipeline::new("users")
//!     .with_stage(Stage::Match(Expr::eq("lastName", json!("B"))))
//!     .with_stage(Stage::Limit(3));
//!
//! let native = render(&pipeline);
//! // [{"$match":{"lastName":{"$eq":"B"}}},{"$limit":3}]
//! ```

mod builder_bridge;
mod expr;
mod render;
mod stage;
mod transpile_aggregate;
mod transpile_connection;
mod transpile_filter;
mod transpile_node;
mod transpile_order;

// Re-export all public types
pub use builder_bridge::*;
pub use expr::*;
pub use render::*;
pub use stage::*;
pub use transpile_aggregate::*;
pub use transpile_connection::*;
pub use transpile_filter::*;
pub use transpile_node::*;
pub use transpile_order::*;
