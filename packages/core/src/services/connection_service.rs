//! Connection Service
//!
//! Creates, updates and removes parent/child connections while keeping the
//! graph invariants intact after every committed mutation:
//!
//! 1. Sibling ranks under one parent are unique and contiguous from 1
//! 2. A node with at least one parent has exactly one primary parent connection
//! 3. The graph is acyclic
//! 4. Cached contexts match the graph
//!
//! # Architecture
//!
//! Each public operation runs in one [`GraphTransaction`]. The transaction
//! level building blocks (`link`, `unlink`, `set_primary`, ...) are public so
//! that node deletion, version publishing and the changelog workers can compose
//! them inside their own transactions.
//!
//! Rank shifting and primary promotion are self-healing: callers never have to
//! repair siblings after a connect or disconnect.

use crate::models::{Connection, ConnectionUpdate, PublicId, Relevance, StoreScope};
use crate::operations::{close_gaps, next_rank, rank_connections};
use crate::services::context_updater::ContextUpdater;
use crate::services::error::{TaxonomyError, TaxonomyResult};
use crate::services::transaction::{GraphTransaction, TransactionManager};
use std::collections::HashMap;
use std::sync::Arc;

/// Parameters for a new connection
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub parent_id: PublicId,
    pub child_id: PublicId,
    pub relevance: Relevance,
    /// Desired rank; appended after the last sibling when `None`
    pub rank: Option<i32>,
    /// Requested primary flag; defaults to `true`. Ignored (forced `true`) for
    /// the child's first parent connection.
    pub primary: Option<bool>,
    /// Explicit connection id; generated when `None`
    pub public_id: Option<PublicId>,
}

impl NewConnection {
    pub fn new(parent_id: PublicId, child_id: PublicId) -> Self {
        Self {
            parent_id,
            child_id,
            relevance: Relevance::Core,
            rank: None,
            primary: None,
            public_id: None,
        }
    }

    pub fn with_relevance(mut self, relevance: Relevance) -> Self {
        self.relevance = relevance;
        self
    }

    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_public_id(mut self, public_id: PublicId) -> Self {
        self.public_id = Some(public_id);
        self
    }
}

pub struct ConnectionService {
    transactions: Arc<TransactionManager>,
    contexts: ContextUpdater,
}

impl ConnectionService {
    pub fn new(transactions: Arc<TransactionManager>, contexts: ContextUpdater) -> Self {
        Self {
            transactions,
            contexts,
        }
    }

    /// Connect `child` under `parent`.
    ///
    /// # Arguments
    ///
    /// * `scope` - Namespace to mutate
    /// * `rank` - Desired position among the parent's children (clamped to `1..=N+1`)
    /// * `primary` - Requested primary flag (default `true`)
    ///
    /// # Errors
    ///
    /// - `SelfConnection` if `parent == child`
    /// - `NodeNotFound` if either node is missing
    /// - `WouldCreateCycle` if `parent` is reachable from `child`
    /// - `InvalidArgument` if `parent` cannot have children
    /// - `DuplicateConnection` if the edge already exists
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use taxonomy_core::services::ConnectionService;
    /// # use taxonomy_core::models::{PublicId, Relevance, StoreScope};
    /// # async fn example(service: &ConnectionService) -> anyhow::Result<()> {
    /// let subject = PublicId::parse("urn:subject:1")?;
    /// let topic = PublicId::parse("urn:topic:1")?;
    /// let connection = service
    ///     .connect_parent_child(&StoreScope::Default, &subject, &topic, Relevance::Core, None, None)
    ///     .await?;
    /// assert!(connection.primary);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect_parent_child(
        &self,
        scope: &StoreScope,
        parent_id: &PublicId,
        child_id: &PublicId,
        relevance: Relevance,
        rank: Option<i32>,
        primary: Option<bool>,
    ) -> TaxonomyResult<Connection> {
        let request = NewConnection {
            parent_id: parent_id.clone(),
            child_id: child_id.clone(),
            relevance,
            rank,
            primary,
            public_id: None,
        };
        self.connect(scope, request).await
    }

    /// Connect using a full [`NewConnection`] request
    pub async fn connect(&self, scope: &StoreScope, request: NewConnection) -> TaxonomyResult<Connection> {
        let mut tx = self.transactions.begin(scope).await?;
        let child_id = request.child_id.clone();
        let connection_id = self.link(&mut tx, request)?;
        self.contexts.update_contexts(&mut tx, &child_id)?;
        let connection = tx.connection(&connection_id)?.clone();
        tx.commit().await?;

        tracing::info!(
            "Connected {} -> {} (rank {}, primary {})",
            connection.parent_id,
            connection.child_id,
            connection.rank,
            connection.primary
        );
        Ok(connection)
    }

    /// Remove a connection, close the rank gap and promote a new primary if needed
    pub async fn disconnect_parent_child(
        &self,
        scope: &StoreScope,
        connection_id: &PublicId,
    ) -> TaxonomyResult<Connection> {
        let mut tx = self.transactions.begin(scope).await?;
        let removed = self.unlink(&mut tx, connection_id)?;
        self.contexts.update_contexts(&mut tx, &removed.child_id)?;
        tx.commit().await?;

        tracing::info!("Disconnected {} -> {}", removed.parent_id, removed.child_id);
        Ok(removed)
    }

    /// [`disconnect_parent_child`](Self::disconnect_parent_child) by endpoint ids
    pub async fn disconnect_parent_child_by_nodes(
        &self,
        scope: &StoreScope,
        parent_id: &PublicId,
        child_id: &PublicId,
    ) -> TaxonomyResult<Connection> {
        let mut tx = self.transactions.begin(scope).await?;
        let connection_id = tx
            .graph()
            .find_connection(parent_id, child_id)
            .map(|c| c.public_id.clone())
            .ok_or_else(|| {
                TaxonomyError::connection_not_found(format!("{} -> {}", parent_id, child_id))
            })?;
        let removed = self.unlink(&mut tx, &connection_id)?;
        self.contexts.update_contexts(&mut tx, child_id)?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Change relevance, rank and/or primary flag of a connection.
    ///
    /// # Errors
    ///
    /// - `ConnectionNotFound` if the connection does not exist
    /// - `InvalidArgument` when unsetting primary on the child's only parent connection
    pub async fn update_parent_child(
        &self,
        scope: &StoreScope,
        connection_id: &PublicId,
        update: ConnectionUpdate,
    ) -> TaxonomyResult<Connection> {
        let mut tx = self.transactions.begin(scope).await?;
        let existing = tx.connection(connection_id)?.clone();

        if let Some(relevance) = update.relevance {
            tx.connection_mut(connection_id)?.relevance = relevance;
        }
        if let Some(rank) = update.rank {
            self.apply_rank(&mut tx, &existing.parent_id, connection_id, rank)?;
        }
        if let Some(primary) = update.primary {
            self.set_primary(&mut tx, connection_id, primary)?;
        }

        self.contexts.update_contexts(&mut tx, &existing.child_id)?;
        let updated = tx.connection(connection_id)?.clone();
        tx.commit().await?;
        Ok(updated)
    }

    /// Hand the primary role of every primary child connection of `node_id` to
    /// another parent of that child. Children without another parent keep it.
    pub async fn replace_primary_connections_for(
        &self,
        scope: &StoreScope,
        node_id: &PublicId,
    ) -> TaxonomyResult<usize> {
        let mut tx = self.transactions.begin(scope).await?;
        let children = self.replace_primaries(&mut tx, node_id)?;
        self.contexts.update_contexts_for(&mut tx, &children)?;
        tx.commit().await?;
        Ok(children.len())
    }

    /// Remove every parent connection of `node_id`
    pub async fn disconnect_all_parents(
        &self,
        scope: &StoreScope,
        node_id: &PublicId,
    ) -> TaxonomyResult<usize> {
        let mut tx = self.transactions.begin(scope).await?;
        let removed = self.unlink_all_parents(&mut tx, node_id)?;
        self.contexts.update_contexts(&mut tx, node_id)?;
        tx.commit().await?;
        Ok(removed.len())
    }

    /// Remove every child connection of `node_id`
    pub async fn disconnect_all_children(
        &self,
        scope: &StoreScope,
        node_id: &PublicId,
    ) -> TaxonomyResult<usize> {
        let mut tx = self.transactions.begin(scope).await?;
        let removed = self.unlink_all_children(&mut tx, node_id)?;
        let children: Vec<PublicId> = removed.iter().map(|c| c.child_id.clone()).collect();
        self.contexts.update_contexts_for(&mut tx, &children)?;
        tx.commit().await?;
        Ok(removed.len())
    }

    pub async fn get_connection(
        &self,
        scope: &StoreScope,
        connection_id: &PublicId,
    ) -> TaxonomyResult<Connection> {
        self.transactions
            .store()
            .get_connection(scope, connection_id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?
            .ok_or_else(|| TaxonomyError::connection_not_found(connection_id))
    }

    /// Parent connections of a node in (rank, id) order
    pub async fn get_parent_connections(
        &self,
        scope: &StoreScope,
        node_id: &PublicId,
    ) -> TaxonomyResult<Vec<Connection>> {
        self.ensure_node(scope, node_id).await?;
        self.transactions
            .store()
            .find_connections_by_child(scope, node_id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))
    }

    /// Child connections of a node in (rank, id) order
    pub async fn get_child_connections(
        &self,
        scope: &StoreScope,
        node_id: &PublicId,
    ) -> TaxonomyResult<Vec<Connection>> {
        self.ensure_node(scope, node_id).await?;
        self.transactions
            .store()
            .find_connections_by_parent(scope, node_id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))
    }

    async fn ensure_node(&self, scope: &StoreScope, node_id: &PublicId) -> TaxonomyResult<()> {
        self.transactions
            .store()
            .get_node(scope, node_id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?
            .ok_or_else(|| TaxonomyError::node_not_found(node_id))
            .map(|_| ())
    }

    // ========================================================================
    // Transaction-level building blocks
    // ========================================================================

    /// Insert a connection, enforcing every invariant except contexts.
    ///
    /// Returns the new connection's id. Callers recompute contexts of the
    /// child afterwards.
    pub fn link(&self, tx: &mut GraphTransaction, request: NewConnection) -> TaxonomyResult<PublicId> {
        let NewConnection {
            parent_id,
            child_id,
            relevance,
            rank,
            primary,
            public_id,
        } = request;

        if parent_id == child_id {
            return Err(TaxonomyError::self_connection(&parent_id));
        }
        let parent_type = tx.node(&parent_id)?.node_type;
        tx.node(&child_id)?;

        if tx.graph().is_reachable(&child_id, &parent_id) {
            return Err(TaxonomyError::would_create_cycle(&parent_id, &child_id));
        }
        if !parent_type.can_have_children() {
            return Err(TaxonomyError::invalid_argument(
                format!("{} nodes cannot have children", parent_type),
                &[&parent_id],
            ));
        }
        if tx.graph().find_connection(&parent_id, &child_id).is_some() {
            return Err(TaxonomyError::duplicate_connection(&parent_id, &child_id));
        }
        if let Some(id) = &public_id {
            if tx.graph().connection(id).is_some() {
                return Err(TaxonomyError::invalid_argument(
                    "connection id already in use",
                    &[id],
                ));
            }
        }

        let existing_parents: Vec<PublicId> = tx
            .graph()
            .parent_connections(&child_id)
            .into_iter()
            .map(|c| c.public_id.clone())
            .collect();
        let make_primary = existing_parents.is_empty() || primary.unwrap_or(true);
        if make_primary {
            for other in &existing_parents {
                tx.connection_mut(other)?.primary = false;
            }
        }

        let mut connection = Connection::new(parent_id.clone(), child_id, relevance);
        if let Some(id) = public_id {
            connection = connection.with_public_id(id);
        }
        connection.rank = next_rank(&tx.graph().child_connections(&parent_id));
        connection.primary = make_primary;
        let connection_id = connection.public_id.clone();
        tx.insert_connection(connection);

        if let Some(rank) = rank {
            self.apply_rank(tx, &parent_id, &connection_id, rank)?;
        }
        Ok(connection_id)
    }

    /// Remove a connection, close the sibling rank gap and promote a
    /// replacement primary parent connection when the removed one was primary.
    pub fn unlink(&self, tx: &mut GraphTransaction, connection_id: &PublicId) -> TaxonomyResult<Connection> {
        let removed = tx.remove_connection(connection_id)?;

        let changes = close_gaps(&tx.graph().child_connections(&removed.parent_id));
        for change in changes {
            tx.connection_mut(&change.connection_id)?.rank = change.new_rank;
        }

        if removed.primary {
            let replacement = tx
                .graph()
                .parent_connections(&removed.child_id)
                .first()
                .map(|c| c.public_id.clone());
            if let Some(replacement) = replacement {
                tx.connection_mut(&replacement)?.primary = true;
                tracing::debug!(
                    "Promoted {} to primary parent connection of {}",
                    replacement,
                    removed.child_id
                );
            }
        }
        Ok(removed)
    }

    /// Move a connection to `desired_rank` among its siblings
    pub fn apply_rank(
        &self,
        tx: &mut GraphTransaction,
        parent_id: &PublicId,
        connection_id: &PublicId,
        desired_rank: i32,
    ) -> TaxonomyResult<()> {
        let changes = rank_connections(
            &tx.graph().child_connections(parent_id),
            connection_id,
            desired_rank,
        );
        for change in changes {
            tx.connection_mut(&change.connection_id)?.rank = change.new_rank;
        }
        Ok(())
    }

    /// Set or unset the primary flag, keeping exactly one primary per child.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when unsetting primary on the child's only parent connection.
    pub fn set_primary(
        &self,
        tx: &mut GraphTransaction,
        connection_id: &PublicId,
        primary: bool,
    ) -> TaxonomyResult<()> {
        let connection = tx.connection(connection_id)?.clone();
        let others: Vec<PublicId> = tx
            .graph()
            .parent_connections(&connection.child_id)
            .into_iter()
            .filter(|c| &c.public_id != connection_id)
            .map(|c| c.public_id.clone())
            .collect();

        if primary {
            for other in &others {
                if tx.connection(other)?.primary {
                    tx.connection_mut(other)?.primary = false;
                }
            }
            if !connection.primary {
                tx.connection_mut(connection_id)?.primary = true;
            }
            return Ok(());
        }

        if !connection.primary {
            return Ok(());
        }
        let Some(replacement) = others.first() else {
            return Err(TaxonomyError::invalid_argument(
                "cannot unset primary on the only parent connection",
                &[connection_id, &connection.child_id],
            ));
        };
        tx.connection_mut(connection_id)?.primary = false;
        tx.connection_mut(replacement)?.primary = true;
        Ok(())
    }

    /// Demote every primary child connection of `node_id` that has an
    /// alternative parent. Returns the affected children.
    pub fn replace_primaries(
        &self,
        tx: &mut GraphTransaction,
        node_id: &PublicId,
    ) -> TaxonomyResult<Vec<PublicId>> {
        tx.node(node_id)?;
        let primaries: Vec<Connection> = tx
            .graph()
            .child_connections(node_id)
            .into_iter()
            .filter(|c| c.primary)
            .cloned()
            .collect();

        let mut affected = Vec::new();
        for connection in primaries {
            match self.set_primary(tx, &connection.public_id, false) {
                Ok(()) => affected.push(connection.child_id),
                Err(TaxonomyError::InvalidArgument { .. }) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(affected)
    }

    pub fn unlink_all_parents(
        &self,
        tx: &mut GraphTransaction,
        node_id: &PublicId,
    ) -> TaxonomyResult<Vec<Connection>> {
        tx.node(node_id)?;
        let ids: Vec<PublicId> = tx
            .graph()
            .parent_connections(node_id)
            .into_iter()
            .map(|c| c.public_id.clone())
            .collect();
        ids.iter().map(|id| self.unlink(tx, id)).collect()
    }

    pub fn unlink_all_children(
        &self,
        tx: &mut GraphTransaction,
        node_id: &PublicId,
    ) -> TaxonomyResult<Vec<Connection>> {
        tx.node(node_id)?;
        let ids: Vec<PublicId> = tx
            .graph()
            .child_connections(node_id)
            .into_iter()
            .map(|c| c.public_id.clone())
            .collect();
        ids.iter().map(|id| self.unlink(tx, id)).collect()
    }

    /// Bring a connection copied from another namespace into this one.
    ///
    /// The connection id is preserved. Relevance and primary flag follow the
    /// copied connection. `source_siblings` are the child connections of the
    /// same parent in the source namespace; the connection is placed right
    /// after the last target sibling that precedes it there, so siblings
    /// copied in any order end up in source order. A stale connection between
    /// the same endpoints under a different id is replaced.
    pub fn adopt(
        &self,
        tx: &mut GraphTransaction,
        source: &Connection,
        source_siblings: &[Connection],
    ) -> TaxonomyResult<()> {
        if let Some(existing) = tx.graph().connection(&source.public_id).cloned() {
            if existing.connects(&source.parent_id, &source.child_id) {
                if existing.relevance != source.relevance {
                    tx.connection_mut(&existing.public_id)?.relevance = source.relevance;
                }
                let rank = Self::adopted_rank(tx, source, source_siblings);
                self.apply_rank(tx, &existing.parent_id, &existing.public_id, rank)?;
                match self.set_primary(tx, &existing.public_id, source.primary) {
                    Ok(()) | Err(TaxonomyError::InvalidArgument { .. }) => {}
                    Err(other) => return Err(other),
                }
                return Ok(());
            }
            self.unlink(tx, &existing.public_id)?;
        }

        let stale = tx
            .graph()
            .find_connection(&source.parent_id, &source.child_id)
            .map(|c| c.public_id.clone());
        if let Some(stale) = stale {
            self.unlink(tx, &stale)?;
        }

        let request = NewConnection {
            parent_id: source.parent_id.clone(),
            child_id: source.child_id.clone(),
            relevance: source.relevance,
            rank: Some(Self::adopted_rank(tx, source, source_siblings)),
            primary: Some(source.primary),
            public_id: Some(source.public_id.clone()),
        };
        self.link(tx, request).map(|_| ())
    }

    fn adopted_rank(tx: &GraphTransaction, source: &Connection, source_siblings: &[Connection]) -> i32 {
        let source_order: HashMap<&PublicId, i32> = source_siblings
            .iter()
            .map(|c| (&c.public_id, c.rank))
            .collect();
        let own = (source.rank, &source.public_id);

        let mut position = 0;
        let siblings = tx.graph().child_connections(&source.parent_id);
        for (index, sibling) in siblings
            .iter()
            .filter(|c| c.public_id != source.public_id)
            .enumerate()
        {
            if let Some(rank) = source_order.get(&sibling.public_id) {
                if (*rank, &sibling.public_id) < own {
                    position = index + 1;
                }
            }
        }
        position as i32 + 1
    }
}
