//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `NodeService` - Node CRUD, context queries and sorted subtrees
//! - `ConnectionService` - Invariant-preserving connect / disconnect / re-rank
//! - `ContextUpdater` - Cached context (path) recomputation
//! - `TreeService` - Recursive subtree materialisation
//! - `VersionService` - Version namespaces and their lifecycle
//! - `PublishService` / `ChangelogProcessor` - Asynchronous cross-namespace publishing
//!
//! Services coordinate between the store and the graph rules. Every mutation
//! runs inside one `GraphTransaction` handed out by the shared
//! `TransactionManager`.

pub mod changelog_processor;
pub mod connection_service;
pub mod context_updater;
pub mod error;
pub mod node_service;
pub mod publish_service;
pub mod transaction;
pub mod tree_service;
pub mod version_service;

pub use changelog_processor::{ChangelogProcessor, PublishHandle, PublishReport};
pub use connection_service::{ConnectionService, NewConnection};
pub use context_updater::ContextUpdater;
pub use error::{ErrorKind, TaxonomyError, TaxonomyResult};
pub use node_service::{NodeService, TreeEntry};
pub use publish_service::PublishService;
pub use transaction::{
    Committed, GraphTransaction, TransactionManager, DOMAIN_EVENT_CHANNEL_CAPACITY,
};
pub use tree_service::{TreeElement, TreeService};
pub use version_service::VersionService;

use crate::db::TaxonomyStore;
use crate::models::TaxonomyConfig;
use std::sync::Arc;

/// All services wired to one store
///
/// Must be constructed inside a tokio runtime: the changelog processor spawns
/// its dispatcher immediately.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use taxonomy_core::db::MemoryStore;
/// use taxonomy_core::models::{NewNode, NodeType, StoreScope, TaxonomyConfig};
/// use taxonomy_core::services::TaxonomyServices;
///
/// # async fn example() -> anyhow::Result<()> {
/// let services = TaxonomyServices::new(Arc::new(MemoryStore::new()), TaxonomyConfig::default());
/// let subject = services
///     .nodes
///     .create_node(&StoreScope::Default, NewNode::new(NodeType::Subject, "Maths"))
///     .await?;
/// assert_eq!(subject.contexts.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct TaxonomyServices {
    pub transactions: Arc<TransactionManager>,
    pub nodes: Arc<NodeService>,
    pub connections: Arc<ConnectionService>,
    pub trees: Arc<TreeService>,
    pub versions: Arc<VersionService>,
    pub publishing: Arc<PublishService>,
}

impl TaxonomyServices {
    pub fn new(store: Arc<dyn TaxonomyStore>, config: TaxonomyConfig) -> Self {
        let contexts = ContextUpdater::new(config.max_traversal_depth);
        let transactions = Arc::new(TransactionManager::new(store));
        let connections = Arc::new(ConnectionService::new(transactions.clone(), contexts.clone()));
        let trees = Arc::new(TreeService::new(transactions.clone(), config.max_traversal_depth));
        let nodes = Arc::new(NodeService::new(
            transactions.clone(),
            connections.clone(),
            contexts.clone(),
            trees.clone(),
        ));
        let versions = Arc::new(VersionService::new(
            transactions.clone(),
            connections.clone(),
            contexts.clone(),
        ));
        let processor = Arc::new(ChangelogProcessor::new(
            transactions.clone(),
            connections.clone(),
            contexts,
            config.merge,
            config.publish,
        ));
        let publishing = Arc::new(PublishService::new(
            transactions.clone(),
            versions.clone(),
            processor,
        ));

        Self {
            transactions,
            nodes,
            connections,
            trees,
            versions,
            publishing,
        }
    }
}
