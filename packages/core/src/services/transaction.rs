//! Graph Transactions
//!
//! A `GraphTransaction` is the unit of work for every graph mutation:
//!
//! 1. Acquire the scope's write lock (one writer per scope at a time)
//! 2. Load a working copy of the scope's graph
//! 3. Mutate the working copy, recording which entities were touched
//! 4. Commit the touched entities as one atomic `ChangeSet`
//! 5. Broadcast the domain events queued during the transaction
//!
//! Dropping a transaction without committing discards every change. Readers
//! never see a half-applied mutation because they read committed snapshots
//! straight from the store.
//!
//! The whole scope graph is loaded per transaction. That keeps the graph
//! algorithms synchronous and simple at the cost of memory proportional to the
//! namespace size.

use crate::db::{ChangeSet, DomainEvent, TaxonomyStore};
use crate::models::{Connection, Node, PublicId, StoreScope, TaxonomyGraph};
use crate::services::error::{TaxonomyError, TaxonomyResult};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

/// Broadcast channel capacity for domain events
pub const DOMAIN_EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Hands out transactions and serialises writers per scope
pub struct TransactionManager {
    store: Arc<dyn TaxonomyStore>,
    locks: Mutex<HashMap<StoreScope, Arc<Mutex<()>>>>,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl TransactionManager {
    pub fn new(store: Arc<dyn TaxonomyStore>) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaxonomyStore> {
        &self.store
    }

    /// Subscribe to events broadcast after commits
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event outside a transaction (publishing progress)
    pub fn emit_event(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Start a transaction on `scope`, waiting for any other writer of that scope
    ///
    /// # Errors
    ///
    /// `Storage` if the scope does not exist or cannot be loaded.
    pub async fn begin(&self, scope: &StoreScope) -> TaxonomyResult<GraphTransaction> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(scope.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;

        let graph = self
            .store
            .load_graph(scope)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;

        Ok(GraphTransaction::new(
            scope.clone(),
            graph,
            guard,
            self.store.clone(),
            self.event_tx.clone(),
        ))
    }

    /// Committed snapshot of a scope, without taking the write lock
    pub async fn snapshot(&self, scope: &StoreScope) -> TaxonomyResult<TaxonomyGraph> {
        self.store
            .load_graph(scope)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Default)]
pub struct Committed {
    /// Stored form of every created or updated node
    pub nodes: Vec<Node>,
    pub deleted_nodes: Vec<PublicId>,
    pub connections: Vec<Connection>,
    pub deleted_connections: Vec<PublicId>,
}

impl Committed {
    pub fn node(&self, id: &PublicId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.public_id == id)
    }
}

/// Working copy of one scope plus the bookkeeping needed to commit it
pub struct GraphTransaction {
    scope: StoreScope,
    graph: TaxonomyGraph,
    existing_nodes: HashSet<PublicId>,
    existing_connections: HashSet<PublicId>,
    touched_nodes: BTreeSet<PublicId>,
    touched_connections: BTreeSet<PublicId>,
    events: Vec<DomainEvent>,
    store: Arc<dyn TaxonomyStore>,
    event_tx: broadcast::Sender<DomainEvent>,
    _guard: OwnedMutexGuard<()>,
}

impl GraphTransaction {
    fn new(
        scope: StoreScope,
        graph: TaxonomyGraph,
        guard: OwnedMutexGuard<()>,
        store: Arc<dyn TaxonomyStore>,
        event_tx: broadcast::Sender<DomainEvent>,
    ) -> Self {
        let existing_nodes = graph.nodes().map(|n| n.public_id.clone()).collect();
        let existing_connections = graph.connections().map(|c| c.public_id.clone()).collect();
        Self {
            scope,
            graph,
            existing_nodes,
            existing_connections,
            touched_nodes: BTreeSet::new(),
            touched_connections: BTreeSet::new(),
            events: Vec::new(),
            store,
            event_tx,
            _guard: guard,
        }
    }

    pub fn scope(&self) -> &StoreScope {
        &self.scope
    }

    /// Read-only view of the working copy
    pub fn graph(&self) -> &TaxonomyGraph {
        &self.graph
    }

    pub fn node(&self, id: &PublicId) -> TaxonomyResult<&Node> {
        self.graph
            .node(id)
            .ok_or_else(|| TaxonomyError::node_not_found(id))
    }

    /// Mutable node access; the node is written back on commit
    pub fn node_mut(&mut self, id: &PublicId) -> TaxonomyResult<&mut Node> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or_else(|| TaxonomyError::node_not_found(id))?;
        self.touched_nodes.insert(id.clone());
        Ok(node)
    }

    pub fn upsert_node(&mut self, node: Node) {
        self.touched_nodes.insert(node.public_id.clone());
        self.graph.upsert_node(node);
    }

    /// Remove a node whose connections have already been removed
    pub fn remove_node(&mut self, id: &PublicId) -> Option<Node> {
        let removed = self.graph.remove_node(id)?;
        self.touched_nodes.insert(id.clone());
        Some(removed)
    }

    pub fn connection(&self, id: &PublicId) -> TaxonomyResult<&Connection> {
        self.graph
            .connection(id)
            .ok_or_else(|| TaxonomyError::connection_not_found(id))
    }

    pub fn connection_mut(&mut self, id: &PublicId) -> TaxonomyResult<&mut Connection> {
        let connection = self
            .graph
            .connection_mut(id)
            .ok_or_else(|| TaxonomyError::connection_not_found(id))?;
        self.touched_connections.insert(id.clone());
        Ok(connection)
    }

    pub fn insert_connection(&mut self, connection: Connection) {
        self.touched_connections.insert(connection.public_id.clone());
        self.graph.insert_connection(connection);
    }

    pub fn remove_connection(&mut self, id: &PublicId) -> TaxonomyResult<Connection> {
        let removed = self
            .graph
            .remove_connection(id)
            .ok_or_else(|| TaxonomyError::connection_not_found(id))?;
        self.touched_connections.insert(id.clone());
        Ok(removed)
    }

    /// Queue an event to broadcast after a successful commit
    pub fn record_event(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    pub fn has_changes(&self) -> bool {
        !self.touched_nodes.is_empty() || !self.touched_connections.is_empty()
    }

    /// Commit every touched entity atomically, then broadcast events.
    ///
    /// # Errors
    ///
    /// `Storage` if the store rejects the change set; nothing is written then.
    pub async fn commit(mut self) -> TaxonomyResult<Committed> {
        let mut changes = ChangeSet::new();
        let mut structural = Vec::new();

        for id in &self.touched_connections {
            match self.graph.connection(id) {
                Some(connection) => changes.upserted_connections.push(connection.clone()),
                None if self.existing_connections.contains(id) => {
                    changes.deleted_connections.push(id.clone())
                }
                None => {}
            }
        }
        for id in &self.touched_nodes {
            match self.graph.node(id) {
                Some(node) => changes.upserted_nodes.push(node.clone()),
                None if self.existing_nodes.contains(id) => changes.deleted_nodes.push(id.clone()),
                None => {}
            }
        }

        if changes.is_empty() {
            tracing::debug!("Nothing to commit in scope {}", self.scope);
            return Ok(Committed::default());
        }

        let connections = changes.upserted_connections.clone();
        let deleted_connections = changes.deleted_connections.clone();
        let deleted_nodes = changes.deleted_nodes.clone();

        let stored = self
            .store
            .apply(&self.scope, changes)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;

        tracing::debug!(
            "Committed scope {}: {} node(s), {} connection(s), {} node deletion(s), {} connection deletion(s)",
            self.scope,
            stored.len(),
            connections.len(),
            deleted_nodes.len(),
            deleted_connections.len()
        );

        for id in &deleted_connections {
            structural.push(DomainEvent::ConnectionDeleted {
                scope: self.scope.clone(),
                id: id.clone(),
            });
        }
        for node in &stored {
            let scope = self.scope.clone();
            structural.push(if self.existing_nodes.contains(&node.public_id) {
                DomainEvent::NodeUpdated { scope, node: node.clone() }
            } else {
                DomainEvent::NodeCreated { scope, node: node.clone() }
            });
        }
        for connection in &connections {
            let scope = self.scope.clone();
            structural.push(if self.existing_connections.contains(&connection.public_id) {
                DomainEvent::ConnectionUpdated {
                    scope,
                    connection: connection.clone(),
                }
            } else {
                DomainEvent::ConnectionCreated {
                    scope,
                    connection: connection.clone(),
                }
            });
        }
        for id in &deleted_nodes {
            structural.push(DomainEvent::NodeDeleted {
                scope: self.scope.clone(),
                id: id.clone(),
            });
        }

        for event in structural.into_iter().chain(self.events.drain(..)) {
            let _ = self.event_tx.send(event);
        }

        Ok(Committed {
            nodes: stored,
            deleted_nodes,
            connections,
            deleted_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NodeType, Relevance};

    fn id(value: &str) -> PublicId {
        PublicId::parse(value).unwrap()
    }

    #[tokio::test]
    async fn test_commit_persists_touched_entities() -> anyhow::Result<()> {
        let store: Arc<dyn TaxonomyStore> = Arc::new(MemoryStore::new());
        let manager = TransactionManager::new(store.clone());
        let mut events = manager.subscribe_to_events();

        let mut tx = manager.begin(&StoreScope::Default).await?;
        tx.upsert_node(Node::with_public_id(id("urn:subject:1"), NodeType::Subject, "S"));
        tx.upsert_node(Node::with_public_id(id("urn:topic:1"), NodeType::Topic, "T"));
        tx.insert_connection(Connection::new(id("urn:subject:1"), id("urn:topic:1"), Relevance::Core));
        let committed = tx.commit().await?;

        assert_eq!(committed.nodes.len(), 2);
        assert!(committed.node(&id("urn:topic:1")).unwrap().id > 0);
        assert_eq!(store.find_children(&StoreScope::Default, &id("urn:subject:1")).await?.len(), 1);

        let first = events.recv().await?;
        assert_eq!(first.event_type(), "node:created");
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_transaction_writes_nothing() -> anyhow::Result<()> {
        let store: Arc<dyn TaxonomyStore> = Arc::new(MemoryStore::new());
        let manager = TransactionManager::new(store.clone());

        {
            let mut tx = manager.begin(&StoreScope::Default).await?;
            tx.upsert_node(Node::with_public_id(id("urn:subject:1"), NodeType::Subject, "S"));
        }

        assert!(store.get_node(&StoreScope::Default, &id("urn:subject:1")).await?.is_none());
        // The scope lock was released with the dropped transaction
        let tx = manager.begin(&StoreScope::Default).await?;
        assert!(!tx.has_changes());
        Ok(())
    }

    #[tokio::test]
    async fn test_begin_on_missing_scope_fails() {
        let manager = TransactionManager::new(Arc::new(MemoryStore::new()));
        let result = manager.begin(&StoreScope::from_hash("nope")).await;
        assert!(matches!(result, Err(TaxonomyError::Storage(_))));
    }
}
