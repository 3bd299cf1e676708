//! Storage backends
//!
//! A storage is a named root that storage and directory lists mirror. The
//! scanner asks it for the entries of one folder at a time and for the
//! location to hand to the media probe.

use async_trait::async_trait;
use rame_common::config::StorageConfig;
use rame_common::model::{Item, ItemKind, List};
use rame_common::ids;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Storage access errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Folder does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Uri escapes the storage root
    #[error("Path outside storage: {0}")]
    OutsideRoot(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

/// What a folder entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Media,
}

/// One entry of a storage folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// File or directory name
    pub name: String,
    /// Path relative to the storage root, `/`-separated
    pub path: String,
    pub kind: EntryKind,
}

/// Media storage
#[async_trait]
pub trait Storage: Send + Sync {
    /// Storage name (also the id of its top-level list)
    fn name(&self) -> &str;

    /// Display title
    fn title(&self) -> &str;

    /// Entries of the folder at `path` (relative, `""` for the root), sorted by name
    async fn list_dir(&self, path: &str) -> Result<Vec<StorageEntry>, StorageError>;

    /// Location of `uri` to hand to the media probe
    fn resolve(&self, uri: &str) -> Result<String, StorageError>;
}

/// Storage rooted in a local directory
pub struct LocalStorage {
    name: String,
    title: String,
    root: PathBuf,
    ignore_patterns: Vec<String>,
}

impl LocalStorage {
    /// Create a storage with default ignore patterns
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git, etc.
    pub fn new(name: impl Into<String>, title: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            root: root.into(),
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                "lost+found".to_string(),
            ],
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.name.clone(), config.display_title(), config.path.clone())
    }

    /// Join a relative path onto the root, refusing anything that escapes it
    fn join_relative(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut joined = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => joined.push(part),
                Component::CurDir => {}
                _ => return Err(StorageError::OutsideRoot(relative.to_string())),
            }
        }
        Ok(joined)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let dir = self.join_relative(path)?;
        if !dir.exists() {
            return Err(StorageError::PathNotFound(dir));
        }
        if !dir.is_dir() {
            return Err(StorageError::NotADirectory(dir));
        }

        let prefix = path.trim_matches('/').to_string();
        let ignore_patterns = self.ignore_patterns.clone();

        // Directory reads block; keep them off the async workers
        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            let walker = WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .follow_links(true)
                .sort_by_file_name();

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!("Error accessing entry: {}", e);
                        continue;
                    }
                };

                let name = entry.file_name().to_string_lossy().to_string();
                if is_ignored(&name, &ignore_patterns) {
                    continue;
                }

                let kind = if entry.file_type().is_dir() {
                    EntryKind::Directory
                } else if entry.file_type().is_file() && is_media_file(&name) {
                    EntryKind::Media
                } else {
                    continue;
                };

                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                entries.push(StorageEntry { name, path, kind });
            }
            entries
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))
    }

    fn resolve(&self, uri: &str) -> Result<String, StorageError> {
        let path = self.join_relative(uri)?;
        Ok(path.to_string_lossy().to_string())
    }
}

/// Hidden entries and system clutter are never listed
///
/// Patterns match whole names only.
fn is_ignored(name: &str, patterns: &[String]) -> bool {
    name.starts_with('.') || patterns.iter().any(|pattern| name == pattern)
}

/// Check if a file name has a playable media extension
pub fn is_media_file(name: &str) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    matches!(
        ext.to_lowercase().as_str(),
        "mp4" | "m4v" | "mkv" | "mov" | "avi" | "webm" | "mpg" | "mpeg" | "ts" | "wmv"
            | "mp3" | "flac" | "ogg" | "oga" | "m4a" | "aac" | "wav" | "opus" | "wma"
    )
}

/// Turn folder entries into list items plus the child lists they refer to
pub fn build_listing(storage: &str, entries: Vec<StorageEntry>, now: i64) -> (Vec<Item>, Vec<List>) {
    let mut items = Vec::with_capacity(entries.len());
    let mut children = Vec::new();

    for entry in entries {
        match entry.kind {
            EntryKind::Directory => {
                let list_id = ids::directory_list_id(storage, &entry.path);
                children.push(List::directory(
                    list_id.clone(),
                    storage,
                    entry.path,
                    entry.name.clone(),
                    now,
                ));
                items.push(Item::list_ref(
                    ItemKind::Directory,
                    list_id,
                    entry.name.clone(),
                    entry.name,
                ));
            }
            EntryKind::Media => {
                items.push(Item::media(ids::item_id(storage, &entry.path), entry.path, None));
            }
        }
    }

    (items, children)
}

/// Storages by name
#[derive(Clone, Default)]
pub struct StorageRegistry {
    storages: HashMap<String, Arc<dyn Storage>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local storages for every configured entry
    pub fn from_config(configs: &[StorageConfig]) -> Self {
        let mut registry = Self::new();
        for config in configs {
            registry.insert(Arc::new(LocalStorage::from_config(config)));
        }
        registry
    }

    pub fn insert(&mut self, storage: Arc<dyn Storage>) {
        self.storages.insert(storage.name().to_string(), storage);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Storage>> {
        self.storages.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.storages.contains_key(name)
    }

    /// Storages sorted by name
    pub fn all(&self) -> Vec<Arc<dyn Storage>> {
        let mut all: Vec<_> = self.storages.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.storages.keys().collect();
        names.sort();
        f.debug_struct("StorageRegistry").field("storages", &names).finish()
    }
}
