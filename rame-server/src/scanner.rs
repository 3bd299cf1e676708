//! Scan scheduling
//!
//! Turns raw storage entries and playlist uris into probed media metadata in
//! the background. Reads never wait for probes: the first read of a list
//! enumerates its folder (storage-backed lists only), starts a scan job if
//! anything is left to probe and returns the current snapshot. Later readers
//! of the same list attach to the running job instead of starting another.
//!
//! Job lifecycle:
//! 1. `start_job` locks the list's job slot, collects the items still
//!    needing a probe and stores a [`ScanHandle`] in the slot. The registry
//!    lock is only held to look the slot up, so lists start independently.
//! 2. The job probes items with bounded parallelism, writing each result
//!    back into the ListStore as soon as it arrives.
//! 3. Once every item was attempted, `refreshed` advances (and is persisted
//!    for playlists), the slot is cleared and completion is broadcast.

use crate::db::playlists;
use crate::probe::{MediaProbe, ProbeError, ProbeResult};
use crate::storage::{build_listing, Storage, StorageError, StorageRegistry};
use crate::store::{ListStore, PendingItem};
use futures::stream::{self, StreamExt};
use rame_common::config::{ReprobePolicy, ScanConfig};
use rame_common::events::{EventBus, ListEvent};
use rame_common::model::List;
use rame_common::time::{now_millis, whole_seconds};
use rame_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Scan behaviour settings
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Maximum probes in flight per job
    pub concurrency: usize,
    pub probe_timeout: Duration,
    pub reprobe: ReprobePolicy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for ScanSettings {
    fn from(config: &ScanConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            reprobe: config.reprobe,
        }
    }
}

/// Handle on a running scan job
///
/// Clones observe the same job; completion is broadcast to all of them.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    done: watch::Receiver<bool>,
}

impl ScanHandle {
    /// Wait until the job has retired
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        // A dropped sender also means the job is gone
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Per-job probe tally
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct JobTally {
    probed: usize,
    failed: usize,
}

/// Running job of one list, if any
type JobSlot = Arc<Mutex<Option<ScanHandle>>>;

/// Background scanner with at most one job per list
pub struct ScanScheduler {
    store: Arc<ListStore>,
    storages: StorageRegistry,
    probe: Arc<dyn MediaProbe>,
    event_bus: EventBus,
    settings: ScanSettings,
    /// Playlist persistence; scanned `refreshed` values are written back
    db: Option<SqlitePool>,
    jobs: Mutex<HashMap<String, JobSlot>>,
}

impl ScanScheduler {
    pub fn new(
        store: Arc<ListStore>,
        storages: StorageRegistry,
        probe: Arc<dyn MediaProbe>,
        event_bus: EventBus,
        settings: ScanSettings,
        db: Option<SqlitePool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            storages,
            probe,
            event_bus,
            settings,
            db,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Snapshot of a list, starting a background scan when items are unresolved
    ///
    /// The snapshot may be partially populated; callers poll until
    /// `refreshed` advances. Fully resolved lists are returned as-is.
    pub async fn ensure_scanned(self: &Arc<Self>, list_id: &str) -> Result<List> {
        let list = self.store.get(list_id).await?;

        if list.is_storage_backed() && !list.enumerated {
            if let Err(e) = self.enumerate(&list, false).await {
                warn!(list_id = %list_id, error = %e, "Failed to enumerate storage folder");
            }
        }

        let retry_failed = self.settings.reprobe == ReprobePolicy::OnRead;
        self.start_job(list_id, retry_failed).await;

        self.store.get(list_id).await
    }

    /// Re-enumerate a storage-backed list and re-probe its failed items
    pub async fn rescan(self: &Arc<Self>, list_id: &str) -> Result<List> {
        let list = self.store.get(list_id).await?;

        if list.is_storage_backed() {
            self.enumerate(&list, true)
                .await
                .map_err(|e| Error::Internal(format!("enumerating '{}': {}", list_id, e)))?;
        }

        self.start_job(list_id, true).await;
        self.store.get(list_id).await
    }

    /// Handle of the job currently scanning a list
    pub async fn active_job(&self, list_id: &str) -> Option<ScanHandle> {
        let slot = self.jobs.lock().await.get(list_id).cloned()?;
        let current = slot.lock().await;
        current.clone()
    }

    /// Drop the job slot of a deleted list
    pub async fn forget(&self, list_id: &str) {
        self.jobs.lock().await.remove(list_id);
    }

    async fn slot(&self, list_id: &str) -> JobSlot {
        self.jobs
            .lock()
            .await
            .entry(list_id.to_string())
            .or_default()
            .clone()
    }

    async fn enumerate(&self, list: &List, force: bool) -> std::result::Result<(), StorageError> {
        let (Some(storage_name), Some(path)) = (list.storage.as_deref(), list.path.as_deref()) else {
            return Ok(());
        };
        let storage = self
            .storages
            .get(storage_name)
            .ok_or_else(|| StorageError::PathNotFound(storage_name.into()))?;

        let entries = storage.list_dir(path).await?;
        let count = entries.len();
        let (items, children) = build_listing(storage_name, entries, now_millis());

        match self.store.set_entries(&list.id, items, children, force).await {
            Ok(true) => debug!(list_id = %list.id, entries = count, "Enumerated folder"),
            Ok(false) => debug!(list_id = %list.id, "Folder already enumerated"),
            // Deleted meanwhile; nothing to store
            Err(_) => {}
        }
        Ok(())
    }

    /// Start a job for the list unless one is running or nothing needs probing
    async fn start_job(self: &Arc<Self>, list_id: &str, retry_failed: bool) -> Option<ScanHandle> {
        let slot = self.slot(list_id).await;
        let mut current = slot.lock().await;
        if let Some(handle) = current.as_ref() {
            debug!(list_id = %list_id, "Attaching to running scan");
            return Some(handle.clone());
        }

        let pending = self.store.pending_items(list_id, retry_failed).await.ok()?;
        if pending.is_empty() {
            return None;
        }

        let (done_tx, done_rx) = watch::channel(false);
        let handle = ScanHandle { done: done_rx };
        *current = Some(handle.clone());
        drop(current);

        info!(list_id = %list_id, pending = pending.len(), "Starting scan");
        self.event_bus.emit_lossy(ListEvent::ScanStarted {
            list_id: list_id.to_string(),
            pending: pending.len(),
        });

        let this = Arc::clone(self);
        let list_id = list_id.to_string();
        tokio::spawn(async move {
            let worker = Arc::clone(&this);
            let job_list_id = list_id.clone();
            let outcome =
                tokio::spawn(async move { worker.run_job(&job_list_id, pending).await }).await;

            let tally = match outcome {
                Ok(tally) => tally,
                Err(e) => {
                    error!(list_id = %list_id, error = %e, "Scan job aborted");
                    JobTally::default()
                }
            };
            this.retire(&list_id, tally, done_tx).await;
        });

        Some(handle)
    }

    async fn run_job(&self, list_id: &str, pending: Vec<PendingItem>) -> JobTally {
        let storage = match self.store.get(list_id).await {
            Ok(list) => list.storage.and_then(|name| self.storages.get(&name)),
            Err(_) => None,
        };

        let results: Vec<bool> = stream::iter(pending)
            .map(|item| {
                let storage = storage.clone();
                async move {
                    match self.probe_item(storage.as_deref(), &item.uri).await {
                        Ok(result) => {
                            self.store
                                .apply_probe(
                                    list_id,
                                    &item.item_id,
                                    result.title,
                                    whole_seconds(result.duration),
                                )
                                .await;
                            self.event_bus.emit_lossy(ListEvent::ItemProbed {
                                list_id: list_id.to_string(),
                                item_id: item.item_id,
                                ok: true,
                            });
                            true
                        }
                        Err(e) => {
                            warn!(
                                list_id = %list_id,
                                uri = %item.uri,
                                error = %e,
                                "Probe failed; item stays unresolved"
                            );
                            self.store.mark_probe_failed(list_id, &item.item_id).await;
                            self.event_bus.emit_lossy(ListEvent::ItemProbed {
                                list_id: list_id.to_string(),
                                item_id: item.item_id,
                                ok: false,
                            });
                            false
                        }
                    }
                }
            })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|ok| !**ok).count();
        JobTally {
            probed: results.len() - failed,
            failed,
        }
    }

    async fn probe_item(
        &self,
        storage: Option<&dyn Storage>,
        uri: &str,
    ) -> std::result::Result<ProbeResult, ProbeError> {
        let storage = storage.ok_or_else(|| ProbeError::UnknownStorage(uri.to_string()))?;
        let location = storage
            .resolve(uri)
            .map_err(|e| ProbeError::Unreadable(e.to_string()))?;

        tokio::time::timeout(self.settings.probe_timeout, self.probe.probe(&location))
            .await
            .map_err(|_| ProbeError::Timeout(self.settings.probe_timeout))?
    }

    async fn retire(&self, list_id: &str, tally: JobTally, done: watch::Sender<bool>) {
        let refreshed = self.store.mark_refreshed(list_id, now_millis()).await;

        if let Some(refreshed) = refreshed {
            info!(
                list_id = %list_id,
                probed = tally.probed,
                failed = tally.failed,
                refreshed,
                "Scan completed"
            );
            self.event_bus.emit_lossy(ListEvent::ScanCompleted {
                list_id: list_id.to_string(),
                refreshed,
                probed: tally.probed,
                failed: tally.failed,
            });
            self.persist_refreshed(list_id, refreshed).await;
        } else {
            debug!(list_id = %list_id, "Scanned list disappeared before completion");
        }

        let slot = self.jobs.lock().await.get(list_id).cloned();
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
        let _ = done.send(true);
    }

    /// Write a playlist's new `refreshed` value through to the database
    async fn persist_refreshed(&self, list_id: &str, refreshed: i64) {
        let Some(db) = &self.db else {
            return;
        };
        // Directory and storage lists have no row; the update is a no-op for them
        if let Err(e) = playlists::update_refreshed(db, list_id, refreshed).await {
            warn!(list_id = %list_id, error = %e, "Failed to persist refreshed value");
        }
    }
}

impl std::fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("storages", &self.storages)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
