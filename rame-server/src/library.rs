//! Library facade
//!
//! Composes the ListStore, the scan scheduler, the status aggregator and
//! optional playlist persistence behind the operations the HTTP API exposes.

use crate::db::playlists::{self, StoredPlaylist};
use crate::probe::MediaProbe;
use crate::scanner::{ScanScheduler, ScanSettings};
use crate::status::StatusAggregator;
use crate::storage::StorageRegistry;
use crate::store::ListStore;
use rame_common::config::TomlConfig;
use rame_common::events::{EventBus, ListEvent};
use rame_common::model::{Item, ItemSpec, List};
use rame_common::time::now_millis;
use rame_common::{ids, Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runtime settings of a [`Library`]
#[derive(Debug, Clone)]
pub struct LibrarySettings {
    pub scan: ScanSettings,
    /// Identity reported as cluster controller
    pub node_name: String,
    pub cluster_ttl: Duration,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

impl LibrarySettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            scan: ScanSettings::from(&config.scan),
            node_name: resolve_node_name(config.node_name.as_deref()),
            cluster_ttl: Duration::from_millis(config.cluster.ttl_ms),
        }
    }
}

/// Controller identity: configured name, then `HOSTNAME`, then a generated one
pub fn resolve_node_name(configured: Option<&str>) -> String {
    if let Some(name) = configured.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.trim().is_empty() {
            return host.trim().to_string();
        }
    }
    let generated = ids::generate_playlist_id();
    format!("rame-{}", &generated[..8])
}

/// Playlist creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlaylist {
    pub items: Vec<ItemSpec>,
    pub storage: String,
    pub title: String,
}

/// Media library shared by all handlers
pub struct Library {
    store: Arc<ListStore>,
    scanner: Arc<ScanScheduler>,
    status: StatusAggregator,
    storages: StorageRegistry,
    event_bus: EventBus,
    db: Option<SqlitePool>,
}

impl Library {
    /// Build a library, register its storages and restore persisted playlists
    pub async fn new(
        settings: LibrarySettings,
        storages: StorageRegistry,
        probe: Arc<dyn MediaProbe>,
        event_bus: EventBus,
        db: Option<SqlitePool>,
    ) -> Result<Self> {
        let store = Arc::new(ListStore::new(now_millis()));

        for storage in storages.all() {
            store
                .register_storage(storage.name(), storage.title(), now_millis())
                .await?;
        }

        let scanner = ScanScheduler::new(
            store.clone(),
            storages.clone(),
            probe,
            event_bus.clone(),
            settings.scan,
            db.clone(),
        );
        let status = StatusAggregator::new(
            store.clone(),
            event_bus.clone(),
            settings.node_name,
            settings.cluster_ttl,
        );

        let library = Self {
            store,
            scanner,
            status,
            storages,
            event_bus,
            db,
        };
        library.restore_playlists().await?;
        Ok(library)
    }

    pub fn store(&self) -> &Arc<ListStore> {
        &self.store
    }

    pub fn scanner(&self) -> &Arc<ScanScheduler> {
        &self.scanner
    }

    pub fn status(&self) -> &StatusAggregator {
        &self.status
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Snapshot of a list, scanning in the background when needed
    pub async fn get_list(&self, id: &str) -> Result<List> {
        self.scanner.ensure_scanned(id).await
    }

    /// Create and persist a playlist; nothing is scanned until it is read
    pub async fn create_playlist(&self, request: NewPlaylist) -> Result<List> {
        if !self.storages.contains(&request.storage) {
            return Err(Error::InvalidOperation(format!(
                "unknown storage '{}'",
                request.storage
            )));
        }

        let list = self
            .store
            .create(request.items, &request.storage, &request.title, now_millis())
            .await?;

        if let Some(db) = &self.db {
            let stored = StoredPlaylist::from_list(&list)?;
            if let Err(e) = playlists::save_playlist(db, &stored).await {
                // Keep memory and database in step
                let _ = self.store.delete(&list.id).await;
                return Err(e);
            }
        }

        info!(list_id = %list.id, items = list.items.len(), storage = %request.storage, "Created playlist");
        self.event_bus.emit_lossy(ListEvent::PlaylistCreated {
            list_id: list.id.clone(),
        });
        Ok(list)
    }

    /// Delete a playlist from the database, then from memory
    ///
    /// A failed database delete leaves the playlist in place so it does not
    /// reappear after a restart.
    pub async fn delete_playlist(&self, id: &str) -> Result<List> {
        let existing = self.store.get(id).await?;
        if !existing.editable() {
            return Err(Error::InvalidOperation(format!(
                "list '{}' is a {} list and cannot be deleted",
                id, existing.kind
            )));
        }

        if let Some(db) = &self.db {
            if !playlists::delete_playlist(db, id).await? {
                warn!(list_id = %id, "Deleted playlist was not persisted");
            }
        }

        let list = self.store.delete(id).await?;
        self.scanner.forget(id).await;

        info!(list_id = %id, "Deleted playlist");
        self.event_bus.emit_lossy(ListEvent::PlaylistDeleted {
            list_id: id.to_string(),
        });
        Ok(list)
    }

    /// Re-enumerate and re-probe a list
    ///
    /// With `wait` set, returns the snapshot after the scan job has retired.
    pub async fn rescan(&self, id: &str, wait: bool) -> Result<List> {
        let list = self.scanner.rescan(id).await?;
        if !wait {
            return Ok(list);
        }

        if let Some(job) = self.scanner.active_job(id).await {
            job.wait().await;
        }
        self.store.get(id).await
    }

    /// Load persisted playlists into the store as unscanned lists
    ///
    /// Returns the number of playlists restored.
    pub async fn restore_playlists(&self) -> Result<usize> {
        let Some(db) = &self.db else {
            return Ok(0);
        };

        let mut restored = 0;
        for stored in playlists::load_playlists(db).await? {
            let items = stored
                .items
                .into_iter()
                .map(|spec| Item::media(ids::item_id(&stored.storage, &spec.uri), spec.uri, spec.title))
                .collect();
            let list = List::playlist(stored.id, stored.title, stored.storage, stored.refreshed, items);
            if self.store.insert_if_absent(list).await {
                restored += 1;
            }
        }

        if restored > 0 {
            info!(playlists = restored, "Restored persisted playlists");
        }
        Ok(restored)
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("storages", &self.storages)
            .field("persistent", &self.db.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tests::FakeProbe;
    use crate::storage::LocalStorage;
    use rame_common::db::init_memory_database;
    use rame_common::model::ListKind;

    fn specs() -> Vec<ItemSpec> {
        vec![
            ItemSpec {
                uri: "blue_screen.mp4".into(),
                title: Some("Blüe Screen".into()),
            },
            ItemSpec {
                uri: "green_screen.mp4".into(),
                title: None,
            },
        ]
    }

    async fn library(dir: &std::path::Path, db: Option<SqlitePool>) -> Library {
        let mut storages = StorageRegistry::new();
        storages.insert(Arc::new(LocalStorage::new("rame", "Rame", dir)));
        let settings = LibrarySettings {
            scan: ScanSettings::default(),
            node_name: "rame-test".into(),
            cluster_ttl: Duration::from_secs(3),
        };
        let probe = Arc::new(FakeProbe::new(
            &[("blue_screen.mp4", Some("Blue"), 3), ("green_screen.mp4", None, 2)],
            Duration::ZERO,
        ));
        Library::new(settings, storages, probe, EventBus::new(16), db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_storages_listed_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(dir.path(), None).await;

        let root = library.get_list("root").await.unwrap();
        assert_eq!(root.items.len(), 1);
        assert_eq!(root.items[0].id, "rame");
        assert_eq!(root.items[0].title, "Rame");
    }

    #[tokio::test]
    async fn test_create_requires_known_storage() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(dir.path(), None).await;

        let result = library
            .create_playlist(NewPlaylist {
                items: specs(),
                storage: "usb".into(),
                title: "Mix".into(),
            })
            .await;
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn test_playlists_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();

        let created = {
            let library = library(dir.path(), Some(pool.clone())).await;
            library
                .create_playlist(NewPlaylist {
                    items: specs(),
                    storage: "rame".into(),
                    title: "Mix".into(),
                })
                .await
                .unwrap()
        };

        let restarted = library(dir.path(), Some(pool.clone())).await;
        let restored = restarted.store().get(&created.id).await.unwrap();
        assert_eq!(restored.kind, ListKind::Playlist);
        assert_eq!(restored.title, "Mix");
        assert_eq!(restored.refreshed, created.refreshed);
        let ids: Vec<_> = restored.items.iter().map(|i| (&i.id, &i.title, i.kind)).collect();
        let expected: Vec<_> = created.items.iter().map(|i| (&i.id, &i.title, i.kind)).collect();
        assert_eq!(ids, expected);

        restarted.delete_playlist(&created.id).await.unwrap();
        let again = library(dir.path(), Some(pool)).await;
        assert!(matches!(again.store().get(&created.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_refreshed_never_regresses_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blue_screen.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("green_screen.mp4"), b"x").unwrap();
        let pool = init_memory_database().await.unwrap();

        let (id, scanned) = {
            let library = library(dir.path(), Some(pool.clone())).await;
            let created = library
                .create_playlist(NewPlaylist {
                    items: specs(),
                    storage: "rame".into(),
                    title: "Mix".into(),
                })
                .await
                .unwrap();
            library.get_list(&created.id).await.unwrap();
            if let Some(job) = library.scanner().active_job(&created.id).await {
                job.wait().await;
            }
            let scanned = library.store().get(&created.id).await.unwrap();
            assert!(scanned.refreshed > created.refreshed);
            (created.id, scanned.refreshed)
        };

        let restarted = library(dir.path(), Some(pool)).await;
        let restored = restarted.store().get(&id).await.unwrap();
        assert!(restored.refreshed >= scanned, "{} < {}", restored.refreshed, scanned);
    }

    #[tokio::test]
    async fn test_failed_database_delete_keeps_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let library = library(dir.path(), Some(pool.clone())).await;
        let created = library
            .create_playlist(NewPlaylist {
                items: specs(),
                storage: "rame".into(),
                title: "Mix".into(),
            })
            .await
            .unwrap();

        pool.close().await;
        assert!(library.delete_playlist(&created.id).await.is_err());
        assert!(library.store().get(&created.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_rescan_wait_returns_scanned_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blue_screen.mp4"), b"x").unwrap();
        let library = library(dir.path(), None).await;

        let before = library.store().get("rame").await.unwrap().refreshed;
        let list = library.rescan("rame", true).await.unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].title, "Blue");
        assert_eq!(list.items[0].duration, Some(3));
        assert!(list.refreshed > before);
        assert!(library.scanner().active_job("rame").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_storage_list_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(dir.path(), None).await;
        assert!(matches!(
            library.delete_playlist("rame").await,
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            library.delete_playlist("missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_node_name_resolution() {
        assert_eq!(resolve_node_name(Some("node-a")), "node-a");
        let fallback = resolve_node_name(Some("  "));
        assert!(!fallback.is_empty());
    }
}
