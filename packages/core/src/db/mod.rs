//! Database Layer
//!
//! Persistence boundary of the taxonomy engine:
//!
//! - [`TaxonomyStore`] - async, scope-parameterised storage trait
//! - [`MemoryStore`] - in-memory, scope-partitioned reference implementation
//! - [`DomainEvent`] - change notifications broadcast after commits
//! - [`DatabaseError`] - store failures
//!
//! # Architecture
//!
//! Services own the graph rules; the store only persists what a committed
//! transaction hands it. Each storage scope (the live graph or one version
//! namespace) is addressed explicitly on every call.

mod error;
pub mod events;
mod memory_store;
mod store;

pub use error::DatabaseError;
pub use events::DomainEvent;
pub use memory_store::MemoryStore;
pub use store::{ChangeSet, TaxonomyStore};
