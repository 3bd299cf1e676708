//! List registry
//!
//! The ListStore is the single owner of list and item state. The registry map
//! is guarded by one lock and every list by its own lock, so writers to
//! different lists never contend and writes to the same list are serialized.
//! No I/O happens here; enumeration and probing are done by the scanner,
//! which writes results back through this API.

use rame_common::model::{Item, ItemKind, ItemSpec, List, ListKind, ROOT_LIST_ID};
use rame_common::{ids, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Item waiting for a probe, as handed to a scan job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub item_id: String,
    pub uri: String,
}

/// Registry of all lists
pub struct ListStore {
    lists: RwLock<HashMap<String, Arc<RwLock<List>>>>,
}

impl ListStore {
    /// Create a store holding only the root list
    pub fn new(now: i64) -> Self {
        let mut lists = HashMap::new();
        lists.insert(ROOT_LIST_ID.to_string(), Arc::new(RwLock::new(List::root(now))));
        Self {
            lists: RwLock::new(lists),
        }
    }

    async fn entry(&self, id: &str) -> Result<Arc<RwLock<List>>> {
        self.lists
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("list '{}'", id)))
    }

    /// Snapshot of a list
    pub async fn get(&self, id: &str) -> Result<List> {
        let entry = self.entry(id).await?;
        let list = entry.read().await;
        Ok(list.clone())
    }

    /// Current `refreshed` of a list, None when unknown
    pub async fn refreshed(&self, id: &str) -> Option<i64> {
        let entry = self.entry(id).await.ok()?;
        let refreshed = entry.read().await.refreshed;
        Some(refreshed)
    }

    /// Register a storage as a top-level list and reference it from root
    ///
    /// Registering the same name twice is a no-op.
    pub async fn register_storage(&self, name: &str, title: &str, now: i64) -> Result<()> {
        if !self.insert_if_absent(List::storage(name, title, now)).await {
            return Ok(());
        }

        let root = self.entry(ROOT_LIST_ID).await?;
        let mut root = root.write().await;
        root.items.push(Item::list_ref(
            ItemKind::Storage,
            name.to_string(),
            name.to_string(),
            title.to_string(),
        ));
        debug!(storage = %name, "Registered storage list");
        Ok(())
    }

    /// Insert a list unless one with the same id exists
    ///
    /// Returns true when inserted.
    pub async fn insert_if_absent(&self, list: List) -> bool {
        let mut lists = self.lists.write().await;
        if lists.contains_key(&list.id) {
            return false;
        }
        lists.insert(list.id.clone(), Arc::new(RwLock::new(list)));
        true
    }

    /// Create a playlist from client item specs
    ///
    /// Items are stored unprobed in the given order; no scanning happens here.
    pub async fn create(
        &self,
        specs: Vec<ItemSpec>,
        storage: &str,
        title: &str,
        now: i64,
    ) -> Result<List> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidOperation("playlist title must not be empty".to_string()));
        }
        if let Some(index) = specs.iter().position(|spec| spec.uri.trim().is_empty()) {
            return Err(Error::InvalidOperation(format!("item {} has an empty uri", index)));
        }

        let items: Vec<Item> = specs
            .into_iter()
            .map(|spec| Item::media(ids::item_id(storage, &spec.uri), spec.uri, spec.title))
            .collect();

        // A fresh UUID cannot collide in practice; retry keeps insertion total
        loop {
            let list = List::playlist(
                ids::generate_playlist_id(),
                title.to_string(),
                storage.to_string(),
                now,
                items.clone(),
            );
            if self.insert_if_absent(list.clone()).await {
                return Ok(list);
            }
        }
    }

    /// Remove a playlist
    ///
    /// Directory and storage lists are rejected and left unchanged.
    pub async fn delete(&self, id: &str) -> Result<List> {
        let mut lists = self.lists.write().await;
        let entry = lists
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("list '{}'", id)))?;

        let list = entry.read().await.clone();
        if list.kind != ListKind::Playlist {
            return Err(Error::InvalidOperation(format!(
                "list '{}' is a {} list and cannot be deleted",
                id, list.kind
            )));
        }

        lists.remove(id);
        Ok(list)
    }

    /// Store the directory entries of a storage-backed list
    ///
    /// Child directory lists are registered first. Existing items with the same
    /// id keep their probed metadata. Unless `force` is set, a list that is
    /// already enumerated is left untouched and false is returned.
    pub async fn set_entries(
        &self,
        id: &str,
        entries: Vec<Item>,
        children: Vec<List>,
        force: bool,
    ) -> Result<bool> {
        let entry = self.entry(id).await?;

        for child in children {
            self.insert_if_absent(child).await;
        }

        let mut list = entry.write().await;
        if list.enumerated && !force {
            return Ok(false);
        }

        let mut previous: HashMap<String, Item> =
            list.items.drain(..).map(|item| (item.id.clone(), item)).collect();
        list.items = entries
            .into_iter()
            .map(|fresh| match previous.remove(&fresh.id) {
                Some(old) if old.kind == fresh.kind => old,
                _ => fresh,
            })
            .collect();
        list.enumerated = true;
        Ok(true)
    }

    /// Media items a scan job should probe
    pub async fn pending_items(&self, id: &str, retry_failed: bool) -> Result<Vec<PendingItem>> {
        let entry = self.entry(id).await?;
        let list = entry.read().await;

        let mut seen = std::collections::HashSet::new();
        Ok(list
            .items
            .iter()
            .filter(|item| item.kind == ItemKind::Regular && item.needs_probe(retry_failed))
            .filter(|item| seen.insert(item.id.clone()))
            .filter_map(|item| {
                item.uri.as_ref().map(|uri| PendingItem {
                    item_id: item.id.clone(),
                    uri: uri.clone(),
                })
            })
            .collect())
    }

    /// Write a successful probe back into every item with this id
    ///
    /// Returns false when the list no longer exists.
    pub async fn apply_probe(
        &self,
        id: &str,
        item_id: &str,
        title: Option<String>,
        duration: u64,
    ) -> bool {
        let Ok(entry) = self.entry(id).await else {
            return false;
        };
        let mut list = entry.write().await;
        for item in list.items.iter_mut().filter(|item| item.id == item_id) {
            item.apply_probe(title.clone(), duration);
        }
        true
    }

    /// Record a failed probe for every item with this id
    pub async fn mark_probe_failed(&self, id: &str, item_id: &str) -> bool {
        let Ok(entry) = self.entry(id).await else {
            return false;
        };
        let mut list = entry.write().await;
        for item in list.items.iter_mut().filter(|item| item.id == item_id) {
            item.mark_failed();
        }
        true
    }

    /// Advance a list's `refreshed` after a completed scan
    pub async fn mark_refreshed(&self, id: &str, now: i64) -> Option<i64> {
        let entry = self.entry(id).await.ok()?;
        let mut list = entry.write().await;
        Some(list.bump_refreshed(now))
    }
}

impl std::fmt::Debug for ListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListStore").finish_non_exhaustive()
    }
}
