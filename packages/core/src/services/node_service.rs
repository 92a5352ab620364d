//! Node Service - Core CRUD Operations
//!
//! This module provides the main business logic layer for node operations:
//!
//! - CRUD operations (create, read, update, delete)
//! - Context queries (all contexts, picked context)
//! - Listing (by type, sorted subtree)
//!
//! # Delete semantics
//!
//! A node is never removed while connections still reference it. Deleting:
//!
//! 1. Hands the primary role of each child connection to another parent where one exists
//! 2. Removes all child connections, then all parent connections
//! 3. Clears the node's cached contexts and removes the node
//! 4. Recomputes contexts of the former children
//!
//! All of this happens in one transaction.

use crate::db::DomainEvent;
use crate::models::{
    DeleteResult, NewNode, Node, NodeType, NodeUpdate, PublicId, StoreScope, TaxonomyContext,
};
use crate::operations::sort_list;
use crate::services::connection_service::ConnectionService;
use crate::services::context_updater::ContextUpdater;
use crate::services::error::{TaxonomyError, TaxonomyResult};
use crate::services::transaction::TransactionManager;
use crate::services::tree_service::TreeService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One row of a sorted subtree listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    pub node: Node,
    pub parent_id: Option<PublicId>,
    pub rank: i32,
}

pub struct NodeService {
    transactions: Arc<TransactionManager>,
    connections: Arc<ConnectionService>,
    contexts: ContextUpdater,
    tree: Arc<TreeService>,
}

impl NodeService {
    pub fn new(
        transactions: Arc<TransactionManager>,
        connections: Arc<ConnectionService>,
        contexts: ContextUpdater,
        tree: Arc<TreeService>,
    ) -> Self {
        Self {
            transactions,
            connections,
            contexts,
            tree,
        }
    }

    /// Subscribe to domain events
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use taxonomy_core::services::NodeService;
    /// # async fn example(service: &NodeService) {
    /// let mut rx = service.subscribe_to_events();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = rx.recv().await {
    ///         println!("Event: {}", event.event_type());
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.transactions.subscribe_to_events()
    }

    /// Create a node and compute its (root) context.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the name is blank
    /// - `InvalidArgument` if the public id is already taken in `scope`
    pub async fn create_node(&self, scope: &StoreScope, request: NewNode) -> TaxonomyResult<Node> {
        let node = request.into_node();
        node.validate()?;

        let mut tx = self.transactions.begin(scope).await?;
        if tx.graph().contains_node(&node.public_id) {
            return Err(TaxonomyError::invalid_argument(
                "public id already in use",
                &[&node.public_id],
            ));
        }
        let public_id = node.public_id.clone();
        tx.upsert_node(node);
        self.contexts.update_contexts(&mut tx, &public_id)?;
        let committed = tx.commit().await?;

        tracing::info!("Created node {} in scope {}", public_id, scope);
        committed
            .node(&public_id)
            .cloned()
            .ok_or_else(|| TaxonomyError::node_not_found(&public_id))
    }

    pub async fn get_node(&self, scope: &StoreScope, id: &PublicId) -> TaxonomyResult<Node> {
        self.transactions
            .store()
            .get_node(scope, id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?
            .ok_or_else(|| TaxonomyError::node_not_found(id))
    }

    /// Apply a partial update.
    ///
    /// Contexts of the node and its descendants are recomputed when the update
    /// touches `is_context`, `visible` or the subject category.
    pub async fn update_node(
        &self,
        scope: &StoreScope,
        id: &PublicId,
        update: NodeUpdate,
    ) -> TaxonomyResult<Node> {
        let mut tx = self.transactions.begin(scope).await?;
        if update.is_empty() {
            return Ok(tx.node(id)?.clone());
        }

        let recompute = update.affects_contexts();
        let node = tx.node_mut(id)?;
        update.apply_to(node);
        node.validate()?;

        if recompute {
            self.contexts.update_contexts(&mut tx, id)?;
        }
        let committed = tx.commit().await?;
        committed
            .node(id)
            .cloned()
            .ok_or_else(|| TaxonomyError::node_not_found(id))
    }

    /// Sever every connection of a node, then delete it.
    ///
    /// Idempotent: deleting a missing node returns `existed == false`.
    pub async fn delete_node(&self, scope: &StoreScope, id: &PublicId) -> TaxonomyResult<DeleteResult> {
        let mut tx = self.transactions.begin(scope).await?;
        if !tx.graph().contains_node(id) {
            return Ok(DeleteResult::not_found());
        }

        self.connections.replace_primaries(&mut tx, id)?;
        let children = self.connections.unlink_all_children(&mut tx, id)?;
        let parents = self.connections.unlink_all_parents(&mut tx, id)?;
        self.contexts.clear_contexts(&mut tx, id)?;
        tx.remove_node(id);

        let former_children: Vec<PublicId> = children.iter().map(|c| c.child_id.clone()).collect();
        self.contexts.update_contexts_for(&mut tx, &former_children)?;
        tx.commit().await?;

        let disconnected = children.len() + parents.len();
        tracing::info!(
            "Deleted node {} from scope {} ({} connection(s) severed)",
            id,
            scope,
            disconnected
        );
        Ok(DeleteResult::existed(disconnected))
    }

    /// Cached contexts of a node, ordered by context id
    pub async fn get_contexts(
        &self,
        scope: &StoreScope,
        id: &PublicId,
    ) -> TaxonomyResult<Vec<TaxonomyContext>> {
        Ok(self.get_node(scope, id).await?.contexts)
    }

    /// Pick one context of a node; see [`crate::models::pick_context`]
    pub async fn pick_context(
        &self,
        scope: &StoreScope,
        id: &PublicId,
        context_id: Option<&str>,
        parent: Option<&PublicId>,
        root: Option<&PublicId>,
    ) -> TaxonomyResult<Option<TaxonomyContext>> {
        let node = self.get_node(scope, id).await?;
        Ok(node.pick_context(context_id, parent, root).cloned())
    }

    /// All nodes of a scope, optionally of one type, ordered by public id
    pub async fn list_nodes(
        &self,
        scope: &StoreScope,
        node_type: Option<NodeType>,
    ) -> TaxonomyResult<Vec<Node>> {
        self.transactions
            .store()
            .find_nodes(scope, node_type)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))
    }

    /// Direct children of a node in rank order
    pub async fn get_children(&self, scope: &StoreScope, id: &PublicId) -> TaxonomyResult<Vec<Node>> {
        self.get_node(scope, id).await?;
        self.transactions
            .store()
            .find_children(scope, id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))
    }

    /// Subtree of `root` in pre-order with siblings by rank; one row per path
    pub async fn get_sorted_tree(
        &self,
        scope: &StoreScope,
        root: &PublicId,
    ) -> TaxonomyResult<Vec<TreeEntry>> {
        let graph = self.transactions.snapshot(scope).await?;
        let elements = sort_list(self.tree.collect(&graph, root, None)?)?;

        elements
            .into_iter()
            .map(|element| {
                let node = graph
                    .node(&element.id)
                    .cloned()
                    .ok_or_else(|| TaxonomyError::node_not_found(&element.id))?;
                Ok(TreeEntry {
                    node,
                    parent_id: element.parent_id,
                    rank: element.rank,
                })
            })
            .collect()
    }

    /// Recompute contexts for every node of a scope
    pub async fn rebuild_contexts(&self, scope: &StoreScope) -> TaxonomyResult<usize> {
        let mut tx = self.transactions.begin(scope).await?;
        let roots: Vec<PublicId> = tx
            .graph()
            .nodes()
            .filter(|n| n.parent_connections.is_empty())
            .map(|n| n.public_id.clone())
            .collect();
        let changed = self.contexts.update_contexts_for(&mut tx, &roots)?;
        tx.commit().await?;
        Ok(changed)
    }
}
