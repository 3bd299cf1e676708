//! List and item data model
//!
//! A [`List`] is an ordered collection of [`Item`]s. The root list enumerates
//! storages, storage and directory lists mirror a folder of a storage, and
//! playlists are created by clients from `{uri, title}` pairs.

use serde::{Deserialize, Serialize};

/// Identifier of the root list
pub const ROOT_LIST_ID: &str = "root";

/// Title of the root list
pub const ROOT_LIST_TITLE: &str = "Root";

/// Kind of list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Root list or a sub-directory of a storage
    Directory,
    /// Top-level list backed by a configured storage
    Storage,
    /// User-created, editable list
    Playlist,
}

impl ListKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Directory => "directory",
            ListKind::Storage => "storage",
            ListKind::Playlist => "playlist",
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Playable media file
    Regular,
    /// Reference to a directory list
    Directory,
    /// Reference to a storage list
    Storage,
}

impl ItemKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Regular => "regular",
            ItemKind::Directory => "directory",
            ItemKind::Storage => "storage",
        }
    }
}

/// Metadata resolution state of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// Never probed
    Pending,
    /// Metadata populated by a successful probe
    Resolved,
    /// Last probe failed; eligible for a later re-probe
    Failed,
}

/// Client-supplied item of a new playlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemSpec {
    /// Location relative to the playlist's storage
    pub uri: String,
    /// Explicit human label; overrides probed titles
    #[serde(default)]
    pub title: Option<String>,
}

/// Entry of a list
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Stable identifier (derived from the source location)
    pub id: String,
    /// File or directory name
    pub name: String,
    /// Human label
    pub title: String,
    pub kind: ItemKind,
    /// Location relative to the storage root (media items only)
    pub uri: Option<String>,
    /// Duration in whole seconds, once probed
    pub duration: Option<u64>,
    /// Title given at playlist creation, if any
    pub explicit_title: Option<String>,
    pub probe_state: ProbeState,
}

impl Item {
    /// Create an unprobed media item
    pub fn media(id: String, uri: String, explicit_title: Option<String>) -> Self {
        let name = name_from_uri(&uri);
        let explicit_title = explicit_title.filter(|t| !t.trim().is_empty());
        let title = explicit_title.clone().unwrap_or_else(|| name.clone());
        Self {
            id,
            name,
            title,
            kind: ItemKind::Regular,
            uri: Some(uri),
            duration: None,
            explicit_title,
            probe_state: ProbeState::Pending,
        }
    }

    /// Create an item referring to another list
    ///
    /// List references carry nothing to probe, so they start resolved.
    pub fn list_ref(kind: ItemKind, list_id: String, name: String, title: String) -> Self {
        Self {
            id: list_id,
            name,
            title,
            kind,
            uri: None,
            duration: None,
            explicit_title: None,
            probe_state: ProbeState::Resolved,
        }
    }

    /// Whether a scan should probe this item
    pub fn needs_probe(&self, retry_failed: bool) -> bool {
        match self.probe_state {
            ProbeState::Pending => true,
            ProbeState::Failed => retry_failed,
            ProbeState::Resolved => false,
        }
    }

    /// Populate metadata from a successful probe
    pub fn apply_probe(&mut self, title: Option<String>, duration: u64) {
        self.duration = Some(duration);
        self.title = match (&self.explicit_title, title) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(probed)) if !probed.trim().is_empty() => probed,
            (None, _) => self.name.clone(),
        };
        self.probe_state = ProbeState::Resolved;
    }

    /// Record a failed probe; resolved metadata is never reverted
    pub fn mark_failed(&mut self) {
        if self.probe_state != ProbeState::Resolved {
            self.probe_state = ProbeState::Failed;
        }
    }
}

/// Named, ordered collection of items
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub id: String,
    pub title: String,
    pub kind: ListKind,
    /// Milliseconds since the Unix epoch of the last completed scan
    pub refreshed: i64,
    pub items: Vec<Item>,
    /// Backing storage name (storage, directory and playlist lists)
    pub storage: Option<String>,
    /// Directory relative to the storage root (storage and directory lists)
    pub path: Option<String>,
    /// Whether directory entries have been read from the storage
    pub enumerated: bool,
}

impl List {
    /// The root list; its items are added as storages register
    pub fn root(refreshed: i64) -> Self {
        Self {
            id: ROOT_LIST_ID.to_string(),
            title: ROOT_LIST_TITLE.to_string(),
            kind: ListKind::Directory,
            refreshed,
            items: Vec::new(),
            storage: None,
            path: None,
            enumerated: true,
        }
    }

    /// Top-level list of a storage; its id is the storage name
    pub fn storage(name: &str, title: &str, refreshed: i64) -> Self {
        Self {
            id: name.to_string(),
            title: title.to_string(),
            kind: ListKind::Storage,
            refreshed,
            items: Vec::new(),
            storage: Some(name.to_string()),
            path: Some(String::new()),
            enumerated: false,
        }
    }

    /// Sub-directory list of a storage
    pub fn directory(id: String, storage: &str, path: String, title: String, refreshed: i64) -> Self {
        Self {
            id,
            title,
            kind: ListKind::Directory,
            refreshed,
            items: Vec::new(),
            storage: Some(storage.to_string()),
            path: Some(path),
            enumerated: false,
        }
    }

    /// User playlist with unprobed items
    pub fn playlist(id: String, title: String, storage: String, refreshed: i64, items: Vec<Item>) -> Self {
        Self {
            id,
            title,
            kind: ListKind::Playlist,
            refreshed,
            items,
            storage: Some(storage),
            path: None,
            enumerated: true,
        }
    }

    /// Only playlists are editable
    pub fn editable(&self) -> bool {
        self.kind == ListKind::Playlist
    }

    /// Whether the list mirrors a storage folder
    pub fn is_storage_backed(&self) -> bool {
        matches!(self.kind, ListKind::Storage | ListKind::Directory) && self.path.is_some()
    }

    /// Advance `refreshed`, keeping it strictly increasing
    pub fn bump_refreshed(&mut self, now: i64) -> i64 {
        self.refreshed = now.max(self.refreshed + 1);
        self.refreshed
    }
}

/// Last path segment of a uri
pub fn name_from_uri(uri: &str) -> String {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(uri)
        .to_string()
}
