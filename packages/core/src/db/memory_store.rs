//! In-memory TaxonomyStore
//!
//! Reference implementation of [`TaxonomyStore`] that keeps one
//! [`TaxonomyGraph`] per storage scope behind a tokio `RwLock`. Used by the
//! tests and by embedders that do not need durability.
//!
//! `apply` validates a change set against a copy of the scope and swaps the
//! copy in only when every write succeeded, so a failed commit leaves the
//! scope untouched.

use crate::db::error::DatabaseError;
use crate::db::store::{ChangeSet, TaxonomyStore};
use crate::models::{
    ChangelogEntry, Connection, DeadLetter, Node, NodeType, PublicId, StoreScope, TaxonomyGraph,
    Version,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct ScopeData {
    graph: TaxonomyGraph,
    next_id: i64,
}

impl ScopeData {
    fn assign_id(&mut self, node: &mut Node) {
        if node.id == 0 {
            if let Some(existing) = self.graph.node(&node.public_id) {
                node.id = existing.id;
            } else {
                self.next_id += 1;
                node.id = self.next_id;
            }
        }
    }

    fn save_node(&mut self, mut node: Node) -> Node {
        self.assign_id(&mut node);
        self.graph.upsert_node(node.clone());
        self.graph.node(&node.public_id).cloned().unwrap_or(node)
    }

    fn save_connection(&mut self, scope: &StoreScope, connection: Connection) -> Result<(), DatabaseError> {
        for endpoint in [&connection.parent_id, &connection.child_id] {
            if !self.graph.contains_node(endpoint) {
                return Err(DatabaseError::missing_entity("node", endpoint.to_string(), scope));
            }
        }
        self.graph.insert_connection(connection);
        Ok(())
    }

    fn delete_node(&mut self, id: &PublicId) -> Result<bool, DatabaseError> {
        let Some(node) = self.graph.node(id) else {
            return Ok(false);
        };
        if !node.parent_connections.is_empty() || !node.child_connections.is_empty() {
            return Err(DatabaseError::change_set_rejected(format!(
                "node '{}' still has {} connection(s)",
                id,
                node.parent_connections.len() + node.child_connections.len()
            )));
        }
        self.graph.remove_node(id);
        Ok(true)
    }
}

/// Scope-partitioned in-memory store
pub struct MemoryStore {
    scopes: RwLock<HashMap<StoreScope, ScopeData>>,
    versions: RwLock<HashMap<PublicId, Version>>,
    next_version_id: AtomicI64,
    changelog: RwLock<Vec<ChangelogEntry>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store holding an empty default scope
    pub fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(StoreScope::Default, ScopeData::default());
        Self {
            scopes: RwLock::new(scopes),
            versions: RwLock::new(HashMap::new()),
            next_version_id: AtomicI64::new(0),
            changelog: RwLock::new(Vec::new()),
            dead_letters: RwLock::new(Vec::new()),
        }
    }

    async fn read_scope<T>(
        &self,
        scope: &StoreScope,
        read: impl FnOnce(&ScopeData) -> T,
    ) -> Result<T> {
        let scopes = self.scopes.read().await;
        let data = scopes
            .get(scope)
            .ok_or_else(|| DatabaseError::scope_not_found(scope))?;
        Ok(read(data))
    }

    async fn write_scope<T>(
        &self,
        scope: &StoreScope,
        write: impl FnOnce(&mut ScopeData) -> Result<T, DatabaseError>,
    ) -> Result<T> {
        let mut scopes = self.scopes.write().await;
        let data = scopes
            .get_mut(scope)
            .ok_or_else(|| DatabaseError::scope_not_found(scope))?;
        Ok(write(data)?)
    }
}

#[async_trait]
impl TaxonomyStore for MemoryStore {
    async fn create_scope(&self, scope: &StoreScope) -> Result<()> {
        let mut scopes = self.scopes.write().await;
        if scopes.contains_key(scope) {
            return Err(DatabaseError::scope_exists(scope).into());
        }
        scopes.insert(scope.clone(), ScopeData::default());
        tracing::debug!("Created scope {}", scope);
        Ok(())
    }

    async fn clone_scope(&self, source: &StoreScope, target: &StoreScope) -> Result<()> {
        let mut scopes = self.scopes.write().await;
        if scopes.contains_key(target) {
            return Err(DatabaseError::scope_exists(target).into());
        }
        let copy = scopes
            .get(source)
            .cloned()
            .ok_or_else(|| DatabaseError::scope_not_found(source))?;
        tracing::debug!(
            "Cloned scope {} into {} ({} nodes, {} connections)",
            source,
            target,
            copy.graph.node_count(),
            copy.graph.connection_count()
        );
        scopes.insert(target.clone(), copy);
        Ok(())
    }

    async fn drop_scope(&self, scope: &StoreScope) -> Result<()> {
        if scope.is_default() {
            return Err(DatabaseError::DefaultScopeImmutable.into());
        }
        let mut scopes = self.scopes.write().await;
        scopes
            .remove(scope)
            .ok_or_else(|| DatabaseError::scope_not_found(scope))?;
        tracing::debug!("Dropped scope {}", scope);
        Ok(())
    }

    async fn scope_exists(&self, scope: &StoreScope) -> Result<bool> {
        Ok(self.scopes.read().await.contains_key(scope))
    }

    async fn save_node(&self, scope: &StoreScope, node: Node) -> Result<Node> {
        self.write_scope(scope, |data| Ok(data.save_node(node))).await
    }

    async fn get_node(&self, scope: &StoreScope, id: &PublicId) -> Result<Option<Node>> {
        self.read_scope(scope, |data| data.graph.node(id).cloned()).await
    }

    async fn find_nodes(&self, scope: &StoreScope, node_type: Option<NodeType>) -> Result<Vec<Node>> {
        self.read_scope(scope, |data| {
            let mut nodes: Vec<Node> = data
                .graph
                .nodes()
                .filter(|n| node_type.map_or(true, |t| n.node_type == t))
                .cloned()
                .collect();
            nodes.sort_by(|a, b| a.public_id.cmp(&b.public_id));
            nodes
        })
        .await
    }

    async fn find_children(&self, scope: &StoreScope, parent: &PublicId) -> Result<Vec<Node>> {
        self.read_scope(scope, |data| {
            data.graph
                .child_connections(parent)
                .into_iter()
                .filter_map(|c| data.graph.node(&c.child_id).cloned())
                .collect()
        })
        .await
    }

    async fn delete_node(&self, scope: &StoreScope, id: &PublicId) -> Result<bool> {
        self.write_scope(scope, |data| data.delete_node(id)).await
    }

    async fn save_connection(&self, scope: &StoreScope, connection: Connection) -> Result<()> {
        self.write_scope(scope, |data| data.save_connection(scope, connection))
            .await
    }

    async fn get_connection(&self, scope: &StoreScope, id: &PublicId) -> Result<Option<Connection>> {
        self.read_scope(scope, |data| data.graph.connection(id).cloned())
            .await
    }

    async fn find_connections_by_parent(
        &self,
        scope: &StoreScope,
        parent: &PublicId,
    ) -> Result<Vec<Connection>> {
        self.read_scope(scope, |data| {
            data.graph
                .child_connections(parent)
                .into_iter()
                .cloned()
                .collect()
        })
        .await
    }

    async fn find_connections_by_child(
        &self,
        scope: &StoreScope,
        child: &PublicId,
    ) -> Result<Vec<Connection>> {
        self.read_scope(scope, |data| {
            data.graph
                .parent_connections(child)
                .into_iter()
                .cloned()
                .collect()
        })
        .await
    }

    async fn delete_connection(&self, scope: &StoreScope, id: &PublicId) -> Result<bool> {
        self.write_scope(scope, |data| Ok(data.graph.remove_connection(id).is_some()))
            .await
    }

    async fn load_graph(&self, scope: &StoreScope) -> Result<TaxonomyGraph> {
        self.read_scope(scope, |data| data.graph.clone()).await
    }

    async fn apply(&self, scope: &StoreScope, changes: ChangeSet) -> Result<Vec<Node>> {
        let mut scopes = self.scopes.write().await;
        let current = scopes
            .get(scope)
            .ok_or_else(|| DatabaseError::scope_not_found(scope))?;

        let mut staged = current.clone();
        for id in &changes.deleted_connections {
            staged.graph.remove_connection(id);
        }
        let stored: Vec<Node> = changes
            .upserted_nodes
            .into_iter()
            .map(|node| staged.save_node(node))
            .collect();
        for connection in changes.upserted_connections {
            staged.save_connection(scope, connection)?;
        }
        for id in &changes.deleted_nodes {
            staged.delete_node(id)?;
        }

        // Re-read so returned nodes carry the final connection indexes
        let stored = stored
            .into_iter()
            .filter_map(|node| staged.graph.node(&node.public_id).cloned())
            .collect();
        scopes.insert(scope.clone(), staged);
        Ok(stored)
    }

    async fn next_id(&self, scope: &StoreScope) -> Result<i64> {
        self.write_scope(scope, |data| {
            data.next_id += 1;
            Ok(data.next_id)
        })
        .await
    }

    async fn save_version(&self, mut version: Version) -> Result<Version> {
        let mut versions = self.versions.write().await;
        if version.id == 0 {
            version.id = match versions.get(&version.public_id) {
                Some(existing) => existing.id,
                None => self.next_version_id.fetch_add(1, Ordering::SeqCst) + 1,
            };
        }
        versions.insert(version.public_id.clone(), version.clone());
        Ok(version)
    }

    async fn get_version(&self, id: &PublicId) -> Result<Option<Version>> {
        Ok(self.versions.read().await.get(id).cloned())
    }

    async fn list_versions(&self) -> Result<Vec<Version>> {
        let mut versions: Vec<Version> = self.versions.read().await.values().cloned().collect();
        versions.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(versions)
    }

    async fn delete_version(&self, id: &PublicId) -> Result<bool> {
        Ok(self.versions.write().await.remove(id).is_some())
    }

    async fn enqueue_changelog(&self, entry: ChangelogEntry) -> Result<()> {
        self.changelog.write().await.push(entry);
        Ok(())
    }

    async fn update_changelog(&self, entry: &ChangelogEntry) -> Result<()> {
        let mut queue = self.changelog.write().await;
        if let Some(slot) = queue.iter_mut().find(|e| e.id == entry.id) {
            *slot = entry.clone();
        }
        Ok(())
    }

    async fn remove_changelog(&self, id: Uuid) -> Result<bool> {
        let mut queue = self.changelog.write().await;
        let before = queue.len();
        queue.retain(|e| e.id != id);
        Ok(queue.len() != before)
    }

    async fn pending_changelog(&self) -> Result<Vec<ChangelogEntry>> {
        Ok(self.changelog.read().await.clone())
    }

    async fn record_dead_letter(&self, letter: DeadLetter) -> Result<()> {
        self.dead_letters.write().await.push(letter);
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.dead_letters.read().await.clone())
    }
}
