//! Data Models
//!
//! This module contains the core data structures of the taxonomy engine:
//!
//! - `Node` - Universal node model for subjects, topics, resources and generic nodes
//! - `Connection` - Ranked parent/child edge between two nodes
//! - `TaxonomyContext` - Cached root-to-node path (derived state)
//! - `TaxonomyGraph` - In-memory working copy of one namespace
//! - `Version` / `StoreScope` - Snapshot namespaces and the storage partition key
//! - `ChangelogEntry` - Persisted replication work item
//! - `TaxonomyConfig` - Engine, publishing and merge configuration

pub mod changelog;
pub mod config;
pub mod connection;
pub mod context;
pub mod graph;
pub mod node;
pub mod version;

pub use changelog::{ChangelogEntity, ChangelogEntry, DeadLetter};
pub use config::{
    FieldGroup, MergePolicy, MergeRule, PublishConfig, TaxonomyConfig,
    DEFAULT_MAX_TRAVERSAL_DEPTH, PUBLISHING_MARKER_FIELDS,
};
pub use connection::{Connection, ConnectionUpdate, Relevance};
pub use context::{extended_context_id, pick_context, root_context_id, TaxonomyContext};
pub use graph::TaxonomyGraph;
pub use node::{
    DeleteResult, NewNode, Node, NodeType, NodeUpdate, PublicId, ValidationError, ACTIVE_CATEGORIES,
    SUBJECT_CATEGORY_FIELD,
};
pub use version::{StoreScope, Version, VersionType};
