//! In-memory connection graph
//!
//! `TaxonomyGraph` is the working copy a transaction mutates: a node table plus
//! an explicit edge table. Each node keeps the ids of its incident connections
//! in `parent_connections` / `child_connections`, and the graph keeps those
//! indexes in step with the edge table on every insert and removal.
//!
//! Traversals here are iterative so that deep or malformed graphs never blow
//! the stack.

use crate::models::connection::Connection;
use crate::models::node::{Node, PublicId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyGraph {
    nodes: HashMap<PublicId, Node>,
    connections: HashMap<PublicId, Connection>,
}

impl TaxonomyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn node(&self, id: &PublicId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &PublicId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: &PublicId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn connection(&self, id: &PublicId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connection_mut(&mut self, id: &PublicId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Insert or replace a node.
    ///
    /// The connection indexes of an existing node are preserved: they belong
    /// to the edge table, not to the caller's copy of the node.
    pub fn upsert_node(&mut self, mut node: Node) {
        if let Some(existing) = self.nodes.get(&node.public_id) {
            node.parent_connections = existing.parent_connections.clone();
            node.child_connections = existing.child_connections.clone();
        } else {
            node.parent_connections.retain(|id| self.connections.contains_key(id));
            node.child_connections.retain(|id| self.connections.contains_key(id));
        }
        self.nodes.insert(node.public_id.clone(), node);
    }

    /// Remove a node. Callers sever its connections first.
    pub fn remove_node(&mut self, id: &PublicId) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Insert or replace a connection and index it on both endpoints.
    ///
    /// Endpoints that are not in the graph are skipped, which lets a graph be
    /// rebuilt from rows in any order.
    pub fn insert_connection(&mut self, connection: Connection) {
        if let Some(previous) = self.connections.get(&connection.public_id).cloned() {
            self.unindex(&previous);
        }
        if let Some(parent) = self.nodes.get_mut(&connection.parent_id) {
            parent.child_connections.insert(connection.public_id.clone());
        }
        if let Some(child) = self.nodes.get_mut(&connection.child_id) {
            child.parent_connections.insert(connection.public_id.clone());
        }
        self.connections.insert(connection.public_id.clone(), connection);
    }

    pub fn remove_connection(&mut self, id: &PublicId) -> Option<Connection> {
        let removed = self.connections.remove(id)?;
        self.unindex(&removed);
        Some(removed)
    }

    fn unindex(&mut self, connection: &Connection) {
        if let Some(parent) = self.nodes.get_mut(&connection.parent_id) {
            parent.child_connections.remove(&connection.public_id);
        }
        if let Some(child) = self.nodes.get_mut(&connection.child_id) {
            child.parent_connections.remove(&connection.public_id);
        }
    }

    /// Parent connections of `node`, ordered by (rank, connection id)
    pub fn parent_connections(&self, node: &PublicId) -> Vec<&Connection> {
        self.indexed(node, |n| &n.parent_connections)
    }

    /// Child connections of `node`, ordered by (rank, connection id)
    pub fn child_connections(&self, node: &PublicId) -> Vec<&Connection> {
        self.indexed(node, |n| &n.child_connections)
    }

    fn indexed<F>(&self, node: &PublicId, select: F) -> Vec<&Connection>
    where
        F: Fn(&Node) -> &std::collections::BTreeSet<PublicId>,
    {
        let mut found: Vec<&Connection> = self
            .nodes
            .get(node)
            .map(|n| {
                select(n)
                    .iter()
                    .filter_map(|id| self.connections.get(id))
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.public_id.cmp(&b.public_id)));
        found
    }

    pub fn find_connection(&self, parent: &PublicId, child: &PublicId) -> Option<&Connection> {
        self.nodes.get(parent).and_then(|p| {
            p.child_connections
                .iter()
                .filter_map(|id| self.connections.get(id))
                .find(|c| &c.child_id == child)
        })
    }

    /// Whether `to` can be reached from `from` by following child connections.
    ///
    /// Iterative DFS with a visited set, so each node is expanded at most once
    /// and the walk is bounded by the number of nodes. A node reaches itself.
    pub fn is_reachable(&self, from: &PublicId, to: &PublicId) -> bool {
        if from == to {
            return true;
        }
        let mut visited: HashSet<&PublicId> = HashSet::new();
        let mut stack: Vec<&PublicId> = vec![from];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for connection_id in &node.child_connections {
                if let Some(connection) = self.connections.get(connection_id) {
                    if &connection.child_id == to {
                        return true;
                    }
                    if !visited.contains(&connection.child_id) {
                        stack.push(&connection.child_id);
                    }
                }
            }
        }
        false
    }

    /// All nodes reachable from `root` through child connections, `root` excluded,
    /// in breadth-first order
    pub fn descendants(&self, root: &PublicId) -> Vec<PublicId> {
        let mut seen: HashSet<PublicId> = HashSet::new();
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::from([root.clone()]);
        seen.insert(root.clone());

        while let Some(current) = queue.pop_front() {
            for connection in self.child_connections(&current) {
                if seen.insert(connection.child_id.clone()) {
                    order.push(connection.child_id.clone());
                    queue.push_back(connection.child_id.clone());
                }
            }
        }
        order
    }
}
