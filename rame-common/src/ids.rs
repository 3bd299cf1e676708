//! Identifier utilities
//!
//! Items and storage directories get ids derived from where they live, so the
//! same file keeps its id across restarts. Playlists get random ids.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hex characters kept from the digest
const DERIVED_ID_LEN: usize = 16;

/// Generate a fresh playlist id (UUIDv4)
pub fn generate_playlist_id() -> String {
    Uuid::new_v4().to_string()
}

/// Stable id of a media item at `uri` inside `storage`
pub fn item_id(storage: &str, uri: &str) -> String {
    derive("item", storage, uri)
}

/// Stable id of the directory list at `path` inside `storage`
pub fn directory_list_id(storage: &str, path: &str) -> String {
    derive("dir", storage, path)
}

fn derive(kind: &str, storage: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", kind, storage, location).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..DERIVED_ID_LEN].to_string()
}
