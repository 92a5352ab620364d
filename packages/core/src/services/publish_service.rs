//! Publishing
//!
//! Entry point for copying a node (and optionally its subtree) from one
//! namespace into a version's namespace. The request is validated and its root
//! changelog entry persisted synchronously; the copy itself runs on the
//! [`ChangelogProcessor`].

use crate::models::{ChangelogEntry, DeadLetter, PublicId, StoreScope};
use crate::services::changelog_processor::{ChangelogProcessor, PublishHandle};
use crate::services::error::{TaxonomyError, TaxonomyResult};
use crate::services::transaction::TransactionManager;
use crate::services::version_service::VersionService;
use std::sync::Arc;
use uuid::Uuid;

pub struct PublishService {
    transactions: Arc<TransactionManager>,
    versions: Arc<VersionService>,
    processor: Arc<ChangelogProcessor>,
}

impl PublishService {
    pub fn new(
        transactions: Arc<TransactionManager>,
        versions: Arc<VersionService>,
        processor: Arc<ChangelogProcessor>,
    ) -> Self {
        Self {
            transactions,
            versions,
            processor,
        }
    }

    /// Publish `node_id` into `target_version`.
    ///
    /// Returns as soon as the request is queued; await
    /// [`PublishHandle::wait`] for completion.
    ///
    /// # Arguments
    ///
    /// * `source_version` - Version to copy from; the live graph when `None`
    /// * `recursive` - Also copy every descendant reachable through child connections
    /// * `include_non_context` - Follow children that are not context nodes
    ///
    /// # Errors
    ///
    /// - `VersionNotFound` if either version is missing
    /// - `InvalidArgument` if the target is locked or equals the source
    /// - `NodeNotFound` if the node does not exist in the source namespace
    pub async fn publish_node(
        &self,
        node_id: &PublicId,
        source_version: Option<&PublicId>,
        target_version: &PublicId,
        recursive: bool,
        include_non_context: bool,
    ) -> TaxonomyResult<PublishHandle> {
        let source = match source_version {
            Some(id) => self.versions.get_version(id).await?.scope(),
            None => StoreScope::Default,
        };
        let target = self.versions.get_version(target_version).await?;
        if target.locked {
            return Err(TaxonomyError::invalid_argument(
                "cannot publish into a locked version",
                &[target_version],
            ));
        }
        if target.scope() == source {
            return Err(TaxonomyError::invalid_argument(
                "source and target namespace are the same",
                &[target_version],
            ));
        }

        self.transactions
            .store()
            .get_node(&source, node_id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?
            .ok_or_else(|| TaxonomyError::node_not_found(node_id))?;

        let entry = ChangelogEntry::root(
            Uuid::new_v4(),
            node_id.clone(),
            source.clone(),
            target.scope(),
            recursive,
            include_non_context,
        );
        tracing::info!(
            "Publishing {} from {} into {} (request {}, recursive: {})",
            node_id,
            source,
            target.scope(),
            entry.request_id,
            recursive
        );
        self.processor.submit(entry).await
    }

    /// Entries still waiting to be copied, in enqueue order
    pub async fn pending_changelog(&self) -> TaxonomyResult<Vec<ChangelogEntry>> {
        self.transactions
            .store()
            .pending_changelog()
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))
    }

    /// Entries abandoned after exhausting their retries
    pub async fn dead_letters(&self) -> TaxonomyResult<Vec<DeadLetter>> {
        self.transactions
            .store()
            .dead_letters()
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))
    }

    pub fn processor(&self) -> &Arc<ChangelogProcessor> {
        &self.processor
    }
}
