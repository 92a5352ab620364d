//! Taxonomy Core Business Logic Layer
//!
//! This crate provides the connection-graph engine of a content taxonomy:
//! subjects, topics, resources and generic nodes linked by ranked
//! parent/child connections, with cached root-to-node paths ("contexts") and
//! publishing of subgraphs into isolated version namespaces.
//!
//! # Architecture
//!
//! - **DAG, not tree**: a node may have several parents; cycles are rejected on insert
//! - **Transactional mutation**: every change runs in one `GraphTransaction` and
//!   commits atomically together with its recomputed contexts
//! - **Explicit scopes**: every store call names the namespace it touches
//! - **Async publishing**: a changelog queue drained by a bounded worker pool
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, Connection, TaxonomyContext, Version, ...)
//! - [`operations`] - Pure ranking and tree-sorting algorithms
//! - [`db`] - Storage trait, in-memory store and domain events
//! - [`services`] - Business services (NodeService, ConnectionService, PublishService, ...)

pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use models::*;
pub use services::*;

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call repeatedly; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
