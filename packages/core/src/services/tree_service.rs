//! Recursive Tree Walker
//!
//! Materialises the subtree below a node as a flat list of
//! [`TreeElement`]s, the input format of [`sort_list`].
//!
//! The graph is a DAG, so a node reachable through several paths appears once
//! per path. Each walk keeps a per-branch stack: meeting a node that is
//! already on the current branch is a cycle and fails fast with
//! `CycleDetected`; a branch deeper than the configured limit fails with
//! `RecursionLimit`.

use crate::models::{NodeType, PublicId, StoreScope, TaxonomyGraph};
use crate::operations::{sort_list, Sortable};
use crate::services::error::{TaxonomyError, TaxonomyResult};
use crate::services::transaction::TransactionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One (node, path) occurrence in a subtree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeElement {
    pub id: PublicId,
    /// `None` for the walk's root
    pub parent_id: Option<PublicId>,
    pub rank: i32,
}

impl Sortable for TreeElement {
    fn sortable_id(&self) -> &PublicId {
        &self.id
    }

    fn sortable_parent_id(&self) -> Option<&PublicId> {
        self.parent_id.as_ref()
    }

    fn sortable_rank(&self) -> i32 {
        self.rank
    }
}

pub struct TreeService {
    transactions: Arc<TransactionManager>,
    max_depth: usize,
}

impl TreeService {
    pub fn new(transactions: Arc<TransactionManager>, max_depth: usize) -> Self {
        Self {
            transactions,
            max_depth,
        }
    }

    /// Every (node, path) below `root`, root first with no parent and rank 0
    pub async fn get_recursive_nodes(
        &self,
        scope: &StoreScope,
        root: &PublicId,
    ) -> TaxonomyResult<Vec<TreeElement>> {
        let graph = self.transactions.snapshot(scope).await?;
        self.collect(&graph, root, None)
    }

    /// Like [`get_recursive_nodes`](Self::get_recursive_nodes), following only
    /// children whose type is in `node_types`
    pub async fn get_recursive_nodes_of_types(
        &self,
        scope: &StoreScope,
        root: &PublicId,
        node_types: &[NodeType],
    ) -> TaxonomyResult<Vec<TreeElement>> {
        let graph = self.transactions.snapshot(scope).await?;
        self.collect(&graph, root, Some(node_types))
    }

    /// Subtree of `root` in pre-order, siblings by rank
    pub async fn get_sorted_tree(
        &self,
        scope: &StoreScope,
        root: &PublicId,
    ) -> TaxonomyResult<Vec<TreeElement>> {
        let elements = self.get_recursive_nodes(scope, root).await?;
        Ok(sort_list(elements)?)
    }

    /// Walk a loaded graph
    pub fn collect(
        &self,
        graph: &TaxonomyGraph,
        root: &PublicId,
        node_types: Option<&[NodeType]>,
    ) -> TaxonomyResult<Vec<TreeElement>> {
        if !graph.contains_node(root) {
            return Err(TaxonomyError::node_not_found(root));
        }
        let mut elements = vec![TreeElement {
            id: root.clone(),
            parent_id: None,
            rank: 0,
        }];
        let mut branch = Vec::new();
        self.walk(graph, root, node_types, &mut branch, &mut elements)?;

        tracing::debug!("Collected {} tree element(s) below {}", elements.len(), root);
        Ok(elements)
    }

    fn walk(
        &self,
        graph: &TaxonomyGraph,
        node_id: &PublicId,
        node_types: Option<&[NodeType]>,
        branch: &mut Vec<PublicId>,
        elements: &mut Vec<TreeElement>,
    ) -> TaxonomyResult<()> {
        if branch.len() >= self.max_depth {
            tracing::error!("Tree recursion limit {} reached at {}", self.max_depth, node_id);
            return Err(TaxonomyError::recursion_limit(node_id, self.max_depth));
        }
        branch.push(node_id.clone());

        for connection in graph.child_connections(node_id) {
            let Some(child) = graph.node(&connection.child_id) else {
                continue;
            };
            if let Some(types) = node_types {
                if !types.contains(&child.node_type) {
                    continue;
                }
            }
            if branch.contains(&connection.child_id) {
                let mut path = branch.clone();
                path.push(connection.child_id.clone());
                tracing::error!("Cycle detected below {} at {}", node_id, connection.child_id);
                return Err(TaxonomyError::cycle_detected(&connection.child_id, &path));
            }

            elements.push(TreeElement {
                id: connection.child_id.clone(),
                parent_id: Some(node_id.clone()),
                rank: connection.rank,
            });
            self.walk(graph, &connection.child_id, node_types, branch, elements)?;
        }

        branch.pop();
        Ok(())
    }
}
