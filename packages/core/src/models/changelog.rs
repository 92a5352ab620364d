//! Changelog entries: the persisted queue of pending replications.
//!
//! An entry exists while replication of one entity is pending. Workers delete
//! it once the copy is committed, or move it to the dead letters after the
//! retry budget is spent.

use crate::models::node::PublicId;
use crate::models::version::StoreScope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The entity a changelog entry replicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntity {
    pub node_id: PublicId,
    /// Connection the node was reached through; `None` for the request root
    pub via_connection: Option<PublicId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub id: Uuid,
    pub request_id: Uuid,
    pub entity: ChangelogEntity,
    pub source: StoreScope,
    pub target: StoreScope,
    pub recursive: bool,
    pub include_non_context: bool,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl ChangelogEntry {
    /// Entry for the node a publish request starts at
    pub fn root(
        request_id: Uuid,
        node_id: PublicId,
        source: StoreScope,
        target: StoreScope,
        recursive: bool,
        include_non_context: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            entity: ChangelogEntity {
                node_id,
                via_connection: None,
            },
            source,
            target,
            recursive,
            include_non_context,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// Entry for a child reached through `connection_id`, inheriting the request settings
    pub fn child(&self, node_id: PublicId, connection_id: PublicId) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: self.request_id,
            entity: ChangelogEntity {
                node_id,
                via_connection: Some(connection_id),
            },
            source: self.source.clone(),
            target: self.target.clone(),
            recursive: self.recursive,
            include_non_context: self.include_non_context,
            attempts: 0,
            created_at: Utc::now(),
        }
    }
}

/// A changelog entry abandoned after exhausting its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub entry: ChangelogEntry,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(entry: ChangelogEntry, error: impl Into<String>) -> Self {
        Self {
            entry,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_entry_inherits_request_settings() {
        let root = ChangelogEntry::root(
            Uuid::new_v4(),
            PublicId::parse("urn:subject:1").unwrap(),
            StoreScope::Default,
            StoreScope::from_hash("abcd1234"),
            true,
            false,
        );
        let child = root.child(
            PublicId::parse("urn:topic:1").unwrap(),
            PublicId::parse("urn:node-connection:1").unwrap(),
        );

        assert_eq!(child.request_id, root.request_id);
        assert_ne!(child.id, root.id);
        assert_eq!(child.target, root.target);
        assert!(child.recursive);
        assert!(!child.include_non_context);
        assert_eq!(child.attempts, 0);
        assert!(child.entity.via_connection.is_some());
    }
}
