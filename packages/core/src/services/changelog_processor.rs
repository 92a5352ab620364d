//! Background Changelog Processor
//!
//! Drains the persisted changelog queue into target namespaces:
//! - One worker task per entry, bounded by a semaphore (`PublishConfig::worker_count`)
//! - A child entry is queued only after its parent's copy has committed
//! - Failed entries are retried with exponential backoff, then dead-lettered
//! - Graceful shutdown support
//!
//! ## Dispatch Model
//!
//! The processor owns a dispatcher task fed by an mpsc channel:
//! 1. `submit()` persists the root entry and sends it to the dispatcher
//! 2. The dispatcher waits for a worker permit and spawns the copy
//! 3. The worker releases its permit, then dispatches follow-up entries
//!    (children, or the same entry after its backoff)
//!
//! The store queue is the source of truth: an entry stays persisted until it
//! is either copied or dead-lettered, so `resume()` can pick up whatever a
//! previous process left behind.
//!
//! ## Completion
//!
//! Every request has a tracker slot counting its outstanding
//! entries. When the count reaches zero the [`PublishReport`] is sent on the
//! request's watch channel and [`PublishHandle::wait`] resolves.

use crate::db::DomainEvent;
use crate::models::{ChangelogEntry, DeadLetter, MergePolicy, PublicId, PublishConfig};
use crate::services::connection_service::ConnectionService;
use crate::services::context_updater::ContextUpdater;
use crate::services::error::{TaxonomyError, TaxonomyResult};
use crate::services::transaction::TransactionManager;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use uuid::Uuid;

/// Outcome of one publish request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub request_id: Uuid,
    /// Entries copied into the target namespace
    pub copied: usize,
    /// Entries abandoned after exhausting their retries
    pub dead_lettered: usize,
}

/// Awaitable completion of a publish request
#[derive(Debug)]
pub struct PublishHandle {
    request_id: Uuid,
    done: watch::Receiver<Option<PublishReport>>,
}

impl PublishHandle {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Resolve once every entry of the request is copied or dead-lettered
    ///
    /// # Errors
    ///
    /// `Storage` if the processor shut down before the request finished,
    /// or before the request was submitted.
    pub async fn wait(mut self) -> TaxonomyResult<PublishReport> {
        let request_id = self.request_id;
        let report = self
            .done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| {
                TaxonomyError::query_failed(format!(
                    "publish request {} abandoned before completion",
                    request_id
                ))
            })?;
        report.as_ref().cloned().ok_or_else(|| {
            TaxonomyError::query_failed(format!("publish request {} has no report", request_id))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Copied,
    DeadLettered,
}

struct RequestState {
    outstanding: usize,
    copied: usize,
    dead_lettered: usize,
    /// Nodes whose children were already queued for this request
    expanded: HashSet<PublicId>,
    done: watch::Sender<Option<PublishReport>>,
}

impl RequestState {
    fn new() -> Self {
        let (done, _) = watch::channel(None);
        Self {
            outstanding: 0,
            copied: 0,
            dead_lettered: 0,
            expanded: HashSet::new(),
            done,
        }
    }
}

#[derive(Default)]
struct TrackerState {
    requests: HashMap<Uuid, RequestState>,
    /// Set by shutdown; no request is tracked afterwards
    closed: bool,
}

/// Outstanding entry counts per publish request
#[derive(Default)]
struct RequestTracker {
    state: Mutex<TrackerState>,
}

impl RequestTracker {
    async fn register(&self, request_id: Uuid) -> watch::Receiver<Option<PublishReport>> {
        let mut state = self.state.lock().await;
        if state.closed {
            // Dropping the sender makes every wait on this receiver fail
            let (_, done) = watch::channel(None);
            return done;
        }
        state
            .requests
            .entry(request_id)
            .or_insert_with(RequestState::new)
            .done
            .subscribe()
    }

    async fn enqueued(&self, request_id: Uuid, count: usize) {
        let mut state = self.state.lock().await;
        if let Some(request) = state.requests.get_mut(&request_id) {
            request.outstanding += count;
        }
    }

    /// `true` the first time `node_id` is expanded within the request
    async fn claim_expansion(&self, request_id: Uuid, node_id: &PublicId) -> bool {
        let mut state = self.state.lock().await;
        match state.requests.get_mut(&request_id) {
            Some(request) => request.expanded.insert(node_id.clone()),
            // Untracked after shutdown: children still go to the persisted queue
            None => true,
        }
    }

    async fn finished(&self, request_id: Uuid, outcome: Outcome) {
        let mut state = self.state.lock().await;
        let Some(request) = state.requests.get_mut(&request_id) else {
            return;
        };
        request.outstanding = request.outstanding.saturating_sub(1);
        match outcome {
            Outcome::Copied => request.copied += 1,
            Outcome::DeadLettered => request.dead_lettered += 1,
        }
        if request.outstanding > 0 {
            return;
        }

        if let Some(request) = state.requests.remove(&request_id) {
            let report = PublishReport {
                request_id,
                copied: request.copied,
                dead_lettered: request.dead_lettered,
            };
            tracing::info!(
                "Publish request {} finished: {} copied, {} dead-lettered",
                request_id,
                report.copied,
                report.dead_lettered
            );
            request.done.send_replace(Some(report));
        }
    }

    /// Stop tracking; returns how many unfinished requests were abandoned
    async fn close(&self) -> usize {
        let mut state = self.state.lock().await;
        state.closed = true;
        let abandoned = state.requests.len();
        state.requests.clear();
        abandoned
    }

    async fn in_flight(&self) -> usize {
        self.state.lock().await.requests.len()
    }
}

enum Step {
    Done(Vec<ChangelogEntry>),
    Retry(ChangelogEntry, Duration),
    Abandoned,
}

struct Worker {
    transactions: Arc<TransactionManager>,
    connections: Arc<ConnectionService>,
    contexts: ContextUpdater,
    merge: MergePolicy,
    config: PublishConfig,
    tracker: RequestTracker,
    queue_tx: mpsc::Sender<ChangelogEntry>,
}

impl Worker {
    async fn dispatch(&self, entry: ChangelogEntry) {
        let entry_id = entry.id;
        if self.queue_tx.send(entry).await.is_err() {
            tracing::warn!(
                "ChangelogProcessor has shut down, entry {} stays queued",
                entry_id
            );
        }
    }

    async fn process(&self, mut entry: ChangelogEntry) -> Step {
        match self.copy_entity(&entry).await {
            Ok(candidates) => {
                let store = self.transactions.store();
                if let Err(e) = store.remove_changelog(entry.id).await {
                    tracing::error!("Failed to remove changelog entry {}: {}", entry.id, e);
                }

                let mut children = Vec::new();
                if !candidates.is_empty()
                    && self
                        .tracker
                        .claim_expansion(entry.request_id, &entry.entity.node_id)
                        .await
                {
                    for child in candidates {
                        match store.enqueue_changelog(child.clone()).await {
                            Ok(()) => children.push(child),
                            Err(e) => tracing::error!(
                                "Failed to enqueue changelog entry for {}: {}",
                                child.entity.node_id,
                                e
                            ),
                        }
                    }
                    self.tracker.enqueued(entry.request_id, children.len()).await;
                }

                tracing::debug!(
                    "Copied {} into {} ({} child entr(ies) queued)",
                    entry.entity.node_id,
                    entry.target,
                    children.len()
                );
                self.tracker.finished(entry.request_id, Outcome::Copied).await;
                Step::Done(children)
            }
            Err(err) => {
                entry.attempts += 1;
                let store = self.transactions.store();

                if err.is_fatal() || entry.attempts > self.config.max_retries {
                    tracing::error!(
                        "Dead-lettering changelog entry {} for {} after {} attempt(s): {}",
                        entry.id,
                        entry.entity.node_id,
                        entry.attempts,
                        err
                    );
                    if let Err(e) = store.remove_changelog(entry.id).await {
                        tracing::error!("Failed to remove changelog entry {}: {}", entry.id, e);
                    }
                    let request_id = entry.request_id;
                    if let Err(e) = store
                        .record_dead_letter(DeadLetter::new(entry, err.to_string()))
                        .await
                    {
                        tracing::error!("Failed to record dead letter: {}", e);
                    }
                    self.tracker.finished(request_id, Outcome::DeadLettered).await;
                    return Step::Abandoned;
                }

                let delay = self.config.backoff_for(entry.attempts);
                tracing::warn!(
                    "Copy of {} into {} failed (attempt {}), retrying in {:?}: {}",
                    entry.entity.node_id,
                    entry.target,
                    entry.attempts,
                    delay,
                    err
                );
                if let Err(e) = store.update_changelog(&entry).await {
                    tracing::error!("Failed to update changelog entry {}: {}", entry.id, e);
                }
                Step::Retry(entry, delay)
            }
        }
    }

    /// Copy one entity into the target namespace.
    ///
    /// Returns the child entries to queue next (empty unless recursive).
    async fn copy_entity(&self, entry: &ChangelogEntry) -> TaxonomyResult<Vec<ChangelogEntry>> {
        let store = self.transactions.store();
        let node_id = &entry.entity.node_id;

        let source_node = store
            .get_node(&entry.source, node_id)
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?
            .ok_or_else(|| TaxonomyError::node_not_found(node_id))?;
        let source_connection = match &entry.entity.via_connection {
            Some(id) => {
                let connection = store
                    .get_connection(&entry.source, id)
                    .await
                    .map_err(|e| TaxonomyError::query_failed(e.to_string()))?
                    .ok_or_else(|| TaxonomyError::connection_not_found(id))?;
                let siblings = store
                    .find_connections_by_parent(&entry.source, &connection.parent_id)
                    .await
                    .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;
                Some((connection, siblings))
            }
            None => None,
        };
        let source_children = if entry.recursive {
            store
                .find_connections_by_parent(&entry.source, node_id)
                .await
                .map_err(|e| TaxonomyError::query_failed(e.to_string()))?
        } else {
            Vec::new()
        };

        let mut candidates = Vec::with_capacity(source_children.len());
        for connection in &source_children {
            let child = store
                .get_node(&entry.source, &connection.child_id)
                .await
                .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;
            let Some(child) = child else {
                continue;
            };
            if !entry.include_non_context && !child.is_context {
                tracing::debug!("Skipping non-context child {}", child.public_id);
                continue;
            }
            candidates.push(entry.child(connection.child_id.clone(), connection.public_id.clone()));
        }

        let mut tx = self.transactions.begin(&entry.target).await?;
        let existing = tx.graph().node(node_id).cloned();
        tx.upsert_node(self.merge.merge(&source_node, existing.as_ref()));

        if let Some((connection, siblings)) = &source_connection {
            self.connections.adopt(&mut tx, connection, siblings)?;
        }

        let mut detached = Vec::new();
        if entry.recursive && existing.is_some() {
            let kept: HashSet<&PublicId> = source_children.iter().map(|c| &c.public_id).collect();
            let stale: Vec<PublicId> = tx
                .graph()
                .child_connections(node_id)
                .into_iter()
                .filter(|c| !kept.contains(&c.public_id))
                .map(|c| c.public_id.clone())
                .collect();
            for connection_id in &stale {
                detached.push(self.connections.unlink(&mut tx, connection_id)?.child_id);
            }
            if !stale.is_empty() {
                tracing::debug!("Removed {} stale child connection(s) of {}", stale.len(), node_id);
            }
        }

        self.contexts.update_contexts(&mut tx, node_id)?;
        self.contexts.update_contexts_for(&mut tx, &detached)?;
        tx.record_event(DomainEvent::EntityPublished {
            request_id: entry.request_id,
            node_id: node_id.clone(),
            target: entry.target.clone(),
        });
        tx.commit().await?;

        Ok(candidates)
    }
}

/// Changelog processor with its dispatcher task
pub struct ChangelogProcessor {
    worker: Arc<Worker>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ChangelogProcessor {
    /// Create the processor and spawn its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        transactions: Arc<TransactionManager>,
        connections: Arc<ConnectionService>,
        contexts: ContextUpdater,
        merge: MergePolicy,
        config: PublishConfig,
    ) -> Self {
        tracing::info!(
            "ChangelogProcessor initializing ({} worker(s), {} retries)",
            config.worker_count,
            config.max_retries
        );

        let (queue_tx, mut queue_rx) = mpsc::channel::<ChangelogEntry>(config.channel_capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let permits = Arc::new(Semaphore::new(config.worker_count.max(1)));

        let worker = Arc::new(Worker {
            transactions,
            connections,
            contexts,
            merge,
            config,
            tracker: RequestTracker::default(),
            queue_tx,
        });

        let dispatcher_worker = worker.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        tracing::info!("ChangelogProcessor shutting down");
                        break;
                    }

                    Some(entry) = queue_rx.recv() => {
                        let Ok(permit) = permits.clone().acquire_owned().await else {
                            break;
                        };
                        let worker = dispatcher_worker.clone();
                        tokio::spawn(async move {
                            let step = worker.process(entry).await;
                            drop(permit);
                            match step {
                                Step::Done(children) => {
                                    for child in children {
                                        worker.dispatch(child).await;
                                    }
                                }
                                Step::Retry(entry, delay) => {
                                    tokio::time::sleep(delay).await;
                                    worker.dispatch(entry).await;
                                }
                                Step::Abandoned => {}
                            }
                        });
                    }
                }
            }
        });

        Self {
            worker,
            shutdown_tx,
        }
    }

    /// Persist a root entry and start processing it
    pub async fn submit(&self, entry: ChangelogEntry) -> TaxonomyResult<PublishHandle> {
        let request_id = entry.request_id;
        let done = self.worker.tracker.register(request_id).await;

        self.worker
            .transactions
            .store()
            .enqueue_changelog(entry.clone())
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;
        self.worker.tracker.enqueued(request_id, 1).await;
        self.worker.dispatch(entry).await;

        Ok(PublishHandle { request_id, done })
    }

    /// Re-dispatch every persisted entry, e.g. after a restart.
    ///
    /// Returns one handle per distinct request found in the queue.
    pub async fn resume(&self) -> TaxonomyResult<Vec<PublishHandle>> {
        let pending = self
            .worker
            .transactions
            .store()
            .pending_changelog()
            .await
            .map_err(|e| TaxonomyError::query_failed(e.to_string()))?;

        let mut handles = Vec::new();
        let mut seen = HashSet::new();
        for entry in &pending {
            if seen.insert(entry.request_id) {
                let done = self.worker.tracker.register(entry.request_id).await;
                handles.push(PublishHandle {
                    request_id: entry.request_id,
                    done,
                });
            }
            self.worker.tracker.enqueued(entry.request_id, 1).await;
        }

        tracing::info!(
            "Resuming {} changelog entr(ies) across {} request(s)",
            pending.len(),
            handles.len()
        );
        for entry in pending {
            self.worker.dispatch(entry).await;
        }
        Ok(handles)
    }

    /// Number of publish requests not yet finished
    pub async fn in_flight(&self) -> usize {
        self.worker.tracker.in_flight().await
    }

    /// Stop dispatching; queued entries stay persisted for `resume()`.
    ///
    /// Every unfinished [`PublishHandle::wait`], and every handle created
    /// afterwards, resolves with an error.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.try_send(()).is_err() {
            tracing::debug!("ChangelogProcessor already shutting down");
        }
        let abandoned = self.worker.tracker.close().await;
        if abandoned > 0 {
            tracing::warn!(
                "ChangelogProcessor shut down with {} unfinished publish request(s)",
                abandoned
            );
        }
    }
}
