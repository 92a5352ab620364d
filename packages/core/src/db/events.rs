//! Domain Events
//!
//! Events emitted by the services after a transaction commits. They follow the
//! observer pattern so other parts of a host application (search indexers,
//! cache invalidation, UI bridges) can react to taxonomy changes without
//! coupling to the service internals.
//!
//! # Architecture
//!
//! Events are sent on a tokio broadcast channel. Emission never blocks and
//! never fails the mutation: with no subscribers the event is dropped.
//!
//! # Event Flow
//!
//! 1. A service mutates the graph inside a `GraphTransaction`
//! 2. The transaction commits atomically
//! 3. The queued events are broadcast in mutation order
//! 4. Subscribers receive them asynchronously

use crate::models::{Connection, Node, PublicId, StoreScope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain events emitted after committed changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    NodeCreated { scope: StoreScope, node: Node },

    NodeUpdated { scope: StoreScope, node: Node },

    NodeDeleted { scope: StoreScope, id: PublicId },

    ConnectionCreated {
        scope: StoreScope,
        connection: Connection,
    },

    /// Rank, relevance or primary flag changed
    ConnectionUpdated {
        scope: StoreScope,
        connection: Connection,
    },

    ConnectionDeleted { scope: StoreScope, id: PublicId },

    /// A node's cached contexts were recomputed
    #[serde(rename_all = "camelCase")]
    ContextsUpdated {
        scope: StoreScope,
        node_id: PublicId,
        context_count: usize,
    },

    /// A changelog entry was copied into its target namespace
    #[serde(rename_all = "camelCase")]
    EntityPublished {
        request_id: Uuid,
        node_id: PublicId,
        target: StoreScope,
    },
}

impl DomainEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::NodeCreated { .. } => "node:created",
            DomainEvent::NodeUpdated { .. } => "node:updated",
            DomainEvent::NodeDeleted { .. } => "node:deleted",
            DomainEvent::ConnectionCreated { .. } => "connection:created",
            DomainEvent::ConnectionUpdated { .. } => "connection:updated",
            DomainEvent::ConnectionDeleted { .. } => "connection:deleted",
            DomainEvent::ContextsUpdated { .. } => "contexts:updated",
            DomainEvent::EntityPublished { .. } => "entity:published",
        }
    }

    /// Scope the change happened in
    pub fn scope(&self) -> &StoreScope {
        match self {
            DomainEvent::NodeCreated { scope, .. }
            | DomainEvent::NodeUpdated { scope, .. }
            | DomainEvent::NodeDeleted { scope, .. }
            | DomainEvent::ConnectionCreated { scope, .. }
            | DomainEvent::ConnectionUpdated { scope, .. }
            | DomainEvent::ConnectionDeleted { scope, .. }
            | DomainEvent::ContextsUpdated { scope, .. } => scope,
            DomainEvent::EntityPublished { target, .. } => target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The tagged JSON shape is what external listeners consume
    #[test]
    fn test_event_serialization_contract() {
        let event = DomainEvent::ContextsUpdated {
            scope: StoreScope::Default,
            node_id: PublicId::parse("urn:topic:1").unwrap(),
            context_count: 2,
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "contextsUpdated");
        assert_eq!(json["nodeId"], "urn:topic:1");
        assert_eq!(json["contextCount"], 2);
        assert_eq!(event.event_type(), "contexts:updated");
    }
}
