//! Context Updater
//!
//! Recomputes the cached contexts (root-to-node paths) of a node and of every
//! node below it. Called synchronously inside the transaction of any mutation
//! that changes a node's ancestry, so committed contexts always match the
//! committed graph.
//!
//! # Algorithm
//!
//! For each node, contexts are built from the contexts of its parents:
//!
//! - A node is a path root when it is flagged `is_context` or has no parents.
//!   A root gets its own context: primary, rank 0, relevance core.
//! - Every parent connection extends every context of the parent by one path
//!   segment. The extension is primary only when the node is not a root itself,
//!   the connection is primary and the parent context is primary.
//! - `is_visible` and `is_active` are AND-ed along the path.
//!
//! Parent contexts are memoised for the duration of one call, so each node is
//! computed once even when many paths lead through it. A per-branch stack turns
//! a revisit into `CycleDetected`; a path longer than the configured depth
//! fails with `RecursionLimit`. Both are fatal: the graph must be repaired.

use crate::db::DomainEvent;
use crate::models::{
    extended_context_id, root_context_id, PublicId, Relevance, TaxonomyContext, TaxonomyGraph,
};
use crate::services::error::{TaxonomyError, TaxonomyResult};
use crate::services::transaction::GraphTransaction;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct ContextUpdater {
    max_depth: usize,
}

impl ContextUpdater {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Recompute contexts of `node_id` and all of its descendants.
    ///
    /// Returns the number of nodes whose cached contexts changed. Running it
    /// twice in a row changes nothing the second time.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if `node_id` is not in the transaction's graph
    /// - `CycleDetected` / `RecursionLimit` on a corrupt graph
    pub fn update_contexts(
        &self,
        tx: &mut GraphTransaction,
        node_id: &PublicId,
    ) -> TaxonomyResult<usize> {
        self.update_contexts_for(tx, std::slice::from_ref(node_id))
    }

    /// Recompute contexts of several subtrees in one pass
    pub fn update_contexts_for(
        &self,
        tx: &mut GraphTransaction,
        node_ids: &[PublicId],
    ) -> TaxonomyResult<usize> {
        let mut targets: Vec<PublicId> = Vec::new();
        let mut seen: BTreeSet<PublicId> = BTreeSet::new();
        for node_id in node_ids {
            tx.node(node_id)?;
            for id in std::iter::once(node_id.clone()).chain(tx.graph().descendants(node_id)) {
                if seen.insert(id.clone()) {
                    targets.push(id);
                }
            }
        }

        let mut memo: HashMap<PublicId, Vec<TaxonomyContext>> = HashMap::new();
        let mut computed = Vec::with_capacity(targets.len());
        for id in &targets {
            let mut stack = Vec::new();
            let contexts = self.compute(tx.graph(), id, &mut memo, &mut stack)?;
            computed.push((id.clone(), contexts));
        }

        let mut changed = 0;
        for (id, contexts) in computed {
            if tx.node(&id)?.contexts == contexts {
                continue;
            }
            let count = contexts.len();
            tx.node_mut(&id)?.contexts = contexts;
            tx.record_event(DomainEvent::ContextsUpdated {
                scope: tx.scope().clone(),
                node_id: id,
                context_count: count,
            });
            changed += 1;
        }

        tracing::debug!(
            "Recomputed contexts for {} node(s), {} changed",
            targets.len(),
            changed
        );
        Ok(changed)
    }

    /// Empty the cached contexts of a node (before it is deleted)
    pub fn clear_contexts(&self, tx: &mut GraphTransaction, node_id: &PublicId) -> TaxonomyResult<()> {
        let node = tx.node_mut(node_id)?;
        node.contexts.clear();
        Ok(())
    }

    /// Contexts of `node_id` as the graph currently stands, without storing them
    pub fn compute_contexts(
        &self,
        graph: &TaxonomyGraph,
        node_id: &PublicId,
    ) -> TaxonomyResult<Vec<TaxonomyContext>> {
        let mut memo = HashMap::new();
        self.compute(graph, node_id, &mut memo, &mut Vec::new())
    }

    fn compute(
        &self,
        graph: &TaxonomyGraph,
        node_id: &PublicId,
        memo: &mut HashMap<PublicId, Vec<TaxonomyContext>>,
        stack: &mut Vec<PublicId>,
    ) -> TaxonomyResult<Vec<TaxonomyContext>> {
        if let Some(cached) = memo.get(node_id) {
            return Ok(cached.clone());
        }
        if stack.contains(node_id) {
            let mut path = stack.clone();
            path.push(node_id.clone());
            tracing::error!("Cycle detected while computing contexts at {}", node_id);
            return Err(TaxonomyError::cycle_detected(node_id, &path));
        }
        if stack.len() >= self.max_depth {
            tracing::error!("Context recursion limit {} reached at {}", self.max_depth, node_id);
            return Err(TaxonomyError::recursion_limit(node_id, self.max_depth));
        }

        let node = graph
            .node(node_id)
            .ok_or_else(|| TaxonomyError::node_not_found(node_id))?;
        let active = node.is_active_category();
        let parents = graph.parent_connections(node_id);
        let is_root = node.is_context || parents.is_empty();

        let mut contexts = Vec::new();
        if is_root {
            contexts.push(TaxonomyContext {
                context_id: root_context_id(node_id),
                root_id: node_id.clone(),
                path: node_id.path_part(),
                breadcrumbs: Vec::new(),
                parent_ids: Vec::new(),
                is_primary: true,
                is_visible: node.visible,
                is_active: active,
                relevance_id: Relevance::Core.public_id().to_string(),
                connection_id: None,
                rank: 0,
            });
        }

        stack.push(node_id.clone());
        for connection in parents {
            let parent_contexts = self.compute(graph, &connection.parent_id, memo, stack)?;
            for parent_context in parent_contexts {
                let mut parent_ids = parent_context.parent_ids.clone();
                parent_ids.push(connection.parent_id.clone());
                let breadcrumbs = parent_ids.iter().skip(1).cloned().collect();

                contexts.push(TaxonomyContext {
                    context_id: extended_context_id(
                        &parent_context.context_id,
                        &connection.public_id,
                    ),
                    root_id: parent_context.root_id.clone(),
                    path: format!("{}{}", parent_context.path, node_id.path_part()),
                    breadcrumbs,
                    parent_ids,
                    is_primary: !is_root && connection.primary && parent_context.is_primary,
                    is_visible: parent_context.is_visible && node.visible,
                    is_active: parent_context.is_active && active,
                    relevance_id: connection.relevance.public_id().to_string(),
                    connection_id: Some(connection.public_id.clone()),
                    rank: connection.rank,
                });
            }
        }
        stack.pop();

        contexts.sort_by(|a, b| a.context_id.cmp(&b.context_id));
        memo.insert(node_id.clone(), contexts.clone());
        Ok(contexts)
    }
}
