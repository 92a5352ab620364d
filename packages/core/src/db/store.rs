//! TaxonomyStore Trait
//!
//! Abstraction over taxonomy persistence. Business logic in the services only
//! talks to this trait, so a relational or document backend can be swapped in
//! without touching the graph algorithms.
//!
//! # Storage scopes
//!
//! Every graph method takes an explicit [`StoreScope`]. `StoreScope::Default`
//! is the live graph; `StoreScope::Version(hash)` is the isolated namespace of
//! one version. There is no ambient "current scope": a call touches exactly the
//! scope it names.
//!
//! Versions, the changelog queue and dead letters are store-wide metadata and
//! are not partitioned by scope.
//!
//! # Atomicity
//!
//! [`TaxonomyStore::apply`] commits a whole [`ChangeSet`] or nothing. Services
//! route every mutation through it; the per-entity writes exist for seeding and
//! for tooling.
//!
//! # Examples
//!
//! ```rust
//! use taxonomy_core::db::{MemoryStore, TaxonomyStore};
//! use taxonomy_core::models::{Node, NodeType, StoreScope};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = MemoryStore::new();
//! let saved = store
//!     .save_node(&StoreScope::Default, Node::new(NodeType::Subject, "Maths"))
//!     .await?;
//! assert!(saved.id > 0);
//! # Ok(())
//! # }
//! ```

use crate::models::{
    ChangelogEntry, Connection, DeadLetter, Node, NodeType, PublicId, StoreScope, TaxonomyGraph,
    Version,
};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// A batch of writes committed atomically to one scope
///
/// Applied in this order: connection deletions, node upserts, connection
/// upserts, node deletions.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub upserted_nodes: Vec<Node>,
    pub deleted_nodes: Vec<PublicId>,
    pub upserted_connections: Vec<Connection>,
    pub deleted_connections: Vec<PublicId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.upserted_nodes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.upserted_connections.is_empty()
            && self.deleted_connections.is_empty()
    }
}

/// Persistence for taxonomy graphs, versions and the publishing queue
///
/// Implementations must be `Send + Sync`: the changelog workers share one
/// store across tasks.
///
/// # Method Categories
///
/// - **Scopes**: create, clone, drop, exists
/// - **Nodes / Connections**: per-entity reads and writes within one scope
/// - **Graph**: whole-scope load and atomic change set commit
/// - **Versions**: version metadata
/// - **Changelog**: pending replication entries and dead letters
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    /// Create an empty scope
    ///
    /// # Errors
    ///
    /// Fails if the scope already exists.
    async fn create_scope(&self, scope: &StoreScope) -> Result<()>;

    /// Create `target` as a full copy of `source`
    async fn clone_scope(&self, source: &StoreScope, target: &StoreScope) -> Result<()>;

    /// Remove a version scope and everything in it
    async fn drop_scope(&self, scope: &StoreScope) -> Result<()>;

    async fn scope_exists(&self, scope: &StoreScope) -> Result<bool>;

    /// Insert or replace a node by public id, assigning a numeric id when it has none.
    ///
    /// Returns the stored node.
    async fn save_node(&self, scope: &StoreScope, node: Node) -> Result<Node>;

    async fn get_node(&self, scope: &StoreScope, id: &PublicId) -> Result<Option<Node>>;

    /// All nodes, optionally restricted to one type, ordered by public id
    async fn find_nodes(&self, scope: &StoreScope, node_type: Option<NodeType>) -> Result<Vec<Node>>;

    /// Direct children of `parent` in rank order
    async fn find_children(&self, scope: &StoreScope, parent: &PublicId) -> Result<Vec<Node>>;

    /// Delete a node that has no remaining connections.
    ///
    /// Returns `false` if it did not exist.
    async fn delete_node(&self, scope: &StoreScope, id: &PublicId) -> Result<bool>;

    /// Insert or replace a connection; both endpoints must exist
    async fn save_connection(&self, scope: &StoreScope, connection: Connection) -> Result<()>;

    async fn get_connection(&self, scope: &StoreScope, id: &PublicId) -> Result<Option<Connection>>;

    /// Child connections of `parent` in rank order
    async fn find_connections_by_parent(
        &self,
        scope: &StoreScope,
        parent: &PublicId,
    ) -> Result<Vec<Connection>>;

    /// Parent connections of `child` in rank order
    async fn find_connections_by_child(
        &self,
        scope: &StoreScope,
        child: &PublicId,
    ) -> Result<Vec<Connection>>;

    async fn delete_connection(&self, scope: &StoreScope, id: &PublicId) -> Result<bool>;

    /// Snapshot of the whole scope
    async fn load_graph(&self, scope: &StoreScope) -> Result<TaxonomyGraph>;

    /// Commit `changes` atomically.
    ///
    /// Returns the stored form of every upserted node (with numeric ids assigned).
    async fn apply(&self, scope: &StoreScope, changes: ChangeSet) -> Result<Vec<Node>>;

    /// Reserve the next numeric node id of a scope
    async fn next_id(&self, scope: &StoreScope) -> Result<i64>;

    /// Insert or replace a version by public id, assigning a numeric id when it has none
    async fn save_version(&self, version: Version) -> Result<Version>;

    async fn get_version(&self, id: &PublicId) -> Result<Option<Version>>;

    /// All versions ordered by creation time
    async fn list_versions(&self) -> Result<Vec<Version>>;

    async fn delete_version(&self, id: &PublicId) -> Result<bool>;

    async fn enqueue_changelog(&self, entry: ChangelogEntry) -> Result<()>;

    /// Replace a queued entry (attempt counter); no-op if it was already removed
    async fn update_changelog(&self, entry: &ChangelogEntry) -> Result<()>;

    async fn remove_changelog(&self, id: Uuid) -> Result<bool>;

    /// Queued entries in enqueue order
    async fn pending_changelog(&self) -> Result<Vec<ChangelogEntry>>;

    async fn record_dead_letter(&self, letter: DeadLetter) -> Result<()>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;
}
