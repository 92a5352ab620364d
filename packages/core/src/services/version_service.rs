//! Version lifecycle
//!
//! A version is an isolated namespace holding a full copy of the taxonomy
//! graph. Versions move BETA -> PUBLISHED -> ARCHIVED; at most one version is
//! PUBLISHED at a time and publishing a new one archives the previous.

use crate::models::{PublicId, StoreScope, Version, VersionType};
use crate::services::connection_service::ConnectionService;
use crate::services::context_updater::ContextUpdater;
use crate::services::error::{TaxonomyError, TaxonomyResult};
use crate::services::transaction::TransactionManager;
use std::sync::Arc;

pub struct VersionService {
    transactions: Arc<TransactionManager>,
    connections: Arc<ConnectionService>,
    contexts: ContextUpdater,
}

impl VersionService {
    pub fn new(
        transactions: Arc<TransactionManager>,
        connections: Arc<ConnectionService>,
        contexts: ContextUpdater,
    ) -> Self {
        Self {
            transactions,
            connections,
            contexts,
        }
    }

    /// Create a BETA version with its own namespace.
    ///
    /// The namespace starts as a copy of `source`'s namespace, or of the live
    /// graph when no source is given.
    ///
    /// # Errors
    ///
    /// - `VersionNotFound` if `source` does not exist
    /// - `InvalidArgument` if `public_id` is already taken
    pub async fn create_version(
        &self,
        name: impl Into<String>,
        public_id: Option<PublicId>,
        source: Option<&PublicId>,
    ) -> TaxonomyResult<Version> {
        if let Some(id) = &public_id {
            if self.find_version(id).await?.is_some() {
                return Err(TaxonomyError::invalid_argument("version id already in use", &[id]));
            }
        }
        let source_scope = match source {
            Some(id) => self.get_version(id).await?.scope(),
            None => StoreScope::Default,
        };

        let version = Version::new(name, public_id);
        let store = self.transactions.store();
        store
            .clone_scope(&source_scope, &version.scope())
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;
        let version = store
            .save_version(version)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;

        tracing::info!(
            "Created version {} ({}) from {}",
            version.public_id,
            version.scope(),
            source_scope
        );
        Ok(version)
    }

    /// Make a BETA version the PUBLISHED one.
    ///
    /// The previously published version is archived. Inside the newly
    /// published namespace every connection whose child is invisible is
    /// removed and contexts are recomputed.
    pub async fn publish_version(&self, id: &PublicId) -> TaxonomyResult<Version> {
        let mut version = self.get_version(id).await?;
        if version.version_type != VersionType::Beta {
            return Err(TaxonomyError::invalid_argument(
                format!("only BETA versions can be published, found {:?}", version.version_type),
                &[id],
            ));
        }

        let store = self.transactions.store();
        if let Some(mut current) = self.published_version().await? {
            current.mark_archived();
            store
                .save_version(current.clone())
                .await
                .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;
            tracing::info!("Archived version {}", current.public_id);
        }

        version.mark_published();
        let version = store
            .save_version(version)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;

        let removed = self.disconnect_invisible(&version.scope()).await?;
        tracing::info!(
            "Published version {} ({} invisible connection(s) removed)",
            version.public_id,
            removed
        );
        Ok(version)
    }

    /// Delete a version and its namespace.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for locked or PUBLISHED versions.
    pub async fn delete_version(&self, id: &PublicId) -> TaxonomyResult<()> {
        let version = self.get_version(id).await?;
        if version.locked || version.version_type == VersionType::Published {
            return Err(TaxonomyError::invalid_argument(
                "locked or published versions cannot be deleted",
                &[id],
            ));
        }

        let store = self.transactions.store();
        store
            .drop_scope(&version.scope())
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;
        store
            .delete_version(id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;

        tracing::info!("Deleted version {}", id);
        Ok(())
    }

    pub async fn get_version(&self, id: &PublicId) -> TaxonomyResult<Version> {
        self.find_version(id)
            .await?
            .ok_or_else(|| TaxonomyError::version_not_found(id))
    }

    /// Versions in creation order, optionally of one type
    pub async fn list_versions(&self, version_type: Option<VersionType>) -> TaxonomyResult<Vec<Version>> {
        let versions = self
            .transactions
            .store()
            .list_versions()
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;
        Ok(versions
            .into_iter()
            .filter(|v| version_type.map_or(true, |t| v.version_type == t))
            .collect())
    }

    /// The single PUBLISHED version, if any
    pub async fn published_version(&self) -> TaxonomyResult<Option<Version>> {
        Ok(self
            .list_versions(Some(VersionType::Published))
            .await?
            .into_iter()
            .next())
    }

    async fn find_version(&self, id: &PublicId) -> TaxonomyResult<Option<Version>> {
        self.transactions
            .store()
            .get_version(id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))
    }

    async fn disconnect_invisible(&self, scope: &StoreScope) -> TaxonomyResult<usize> {
        let mut tx = self.transactions.begin(scope).await?;
        let graph = tx.graph();
        let invisible: Vec<PublicId> = graph
            .connections()
            .filter(|c| graph.node(&c.child_id).map_or(false, |n| !n.visible))
            .map(|c| c.public_id.clone())
            .collect();

        let mut children = Vec::with_capacity(invisible.len());
        for connection_id in &invisible {
            let removed = self.connections.unlink(&mut tx, connection_id)?;
            children.push(removed.child_id);
        }
        self.contexts.update_contexts_for(&mut tx, &children)?;
        tx.commit().await?;
        Ok(invisible.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, TaxonomyStore};
    use crate::models::{Node, NodeType};

    fn service() -> VersionService {
        let store: Arc<dyn TaxonomyStore> = Arc::new(MemoryStore::new());
        let transactions = Arc::new(TransactionManager::new(store));
        let connections = Arc::new(ConnectionService::new(
            transactions.clone(),
            ContextUpdater::new(1000),
        ));
        VersionService::new(transactions, connections, ContextUpdater::new(1000))
    }

    #[tokio::test]
    async fn test_new_version_copies_live_graph() {
        let service = service();
        let store = service.transactions.store().clone();
        store
            .save_node(&StoreScope::Default, Node::new(NodeType::Subject, "Maths"))
            .await
            .unwrap();

        let version = service.create_version("Beta", None, None).await.unwrap();
        let copied = store.find_nodes(&version.scope(), None).await.unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(version.version_type, VersionType::Beta);
    }

    #[tokio::test]
    async fn test_publishing_archives_previous() {
        let service = service();
        let first = service.create_version("First", None, None).await.unwrap();
        let second = service.create_version("Second", None, None).await.unwrap();

        service.publish_version(&first.public_id).await.unwrap();
        service.publish_version(&second.public_id).await.unwrap();

        let first = service.get_version(&first.public_id).await.unwrap();
        assert_eq!(first.version_type, VersionType::Archived);
        let published = service.published_version().await.unwrap().unwrap();
        assert_eq!(published.public_id, second.public_id);
        assert!(published.locked);
    }

    #[tokio::test]
    async fn test_published_version_cannot_be_deleted() {
        let service = service();
        let version = service.create_version("First", None, None).await.unwrap();
        service.publish_version(&version.public_id).await.unwrap();

        let err = service.delete_version(&version.public_id).await.unwrap_err();
        assert!(matches!(err, TaxonomyError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_delete_drops_namespace() {
        let service = service();
        let version = service.create_version("Scratch", None, None).await.unwrap();
        service.delete_version(&version.public_id).await.unwrap();

        let store = service.transactions.store();
        assert!(!store.scope_exists(&version.scope()).await.unwrap());
        assert!(matches!(
            service.get_version(&version.public_id).await,
            Err(TaxonomyError::VersionNotFound { .. })
        ));
    }
}
