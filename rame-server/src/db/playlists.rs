//! Playlist persistence
//!
//! Playlists are written on create and removed on delete. Only what a client
//! supplied is stored (uris and explicit titles); probed metadata is
//! rebuilt by scanning after a restart.

use rame_common::model::{ItemSpec, List, ListKind};
use rame_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// Playlist row plus its ordered items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPlaylist {
    pub id: String,
    pub title: String,
    pub storage: String,
    pub refreshed: i64,
    pub items: Vec<ItemSpec>,
}

impl StoredPlaylist {
    /// Persistable part of a playlist list
    pub fn from_list(list: &List) -> Result<Self> {
        if list.kind != ListKind::Playlist {
            return Err(Error::InvalidOperation(format!(
                "list '{}' is not a playlist",
                list.id
            )));
        }

        Ok(Self {
            id: list.id.clone(),
            title: list.title.clone(),
            storage: list.storage.clone().unwrap_or_default(),
            refreshed: list.refreshed,
            items: list
                .items
                .iter()
                .filter_map(|item| {
                    item.uri.as_ref().map(|uri| ItemSpec {
                        uri: uri.clone(),
                        title: item.explicit_title.clone(),
                    })
                })
                .collect(),
        })
    }
}

/// Save a playlist, replacing any previous copy with the same id
pub async fn save_playlist(pool: &SqlitePool, playlist: &StoredPlaylist) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO playlists (id, title, storage, refreshed)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            storage = excluded.storage,
            refreshed = excluded.refreshed
        "#,
    )
    .bind(&playlist.id)
    .bind(&playlist.title)
    .bind(&playlist.storage)
    .bind(playlist.refreshed)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM playlist_items WHERE playlist_id = ?")
        .bind(&playlist.id)
        .execute(&mut *tx)
        .await?;

    for (position, item) in playlist.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO playlist_items (playlist_id, position, uri, title) VALUES (?, ?, ?, ?)",
        )
        .bind(&playlist.id)
        .bind(position as i64)
        .bind(&item.uri)
        .bind(&item.title)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete a playlist and its items
///
/// Returns false when no playlist with this id was stored.
pub async fn delete_playlist(pool: &SqlitePool, id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    // Explicit item delete; foreign_keys may be off on foreign connections
    sqlx::query("DELETE FROM playlist_items WHERE playlist_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM playlists WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Record a newer `refreshed` value for a stored playlist
///
/// The stored value never moves backwards. Returns false when no playlist
/// with this id was stored.
pub async fn update_refreshed(pool: &SqlitePool, id: &str, refreshed: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE playlists SET refreshed = MAX(refreshed, ?) WHERE id = ?")
        .bind(refreshed)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load every stored playlist, oldest first
pub async fn load_playlists(pool: &SqlitePool) -> Result<Vec<StoredPlaylist>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, storage, refreshed
        FROM playlists
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let item_rows = sqlx::query(
        r#"
        SELECT playlist_id, uri, title
        FROM playlist_items
        ORDER BY playlist_id, position
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut items: HashMap<String, Vec<ItemSpec>> = HashMap::new();
    for row in item_rows {
        let playlist_id: String = row.get("playlist_id");
        items.entry(playlist_id).or_default().push(ItemSpec {
            uri: row.get("uri"),
            title: row.get("title"),
        });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let id: String = row.get("id");
            StoredPlaylist {
                items: items.remove(&id).unwrap_or_default(),
                title: row.get("title"),
                storage: row.get("storage"),
                refreshed: row.get("refreshed"),
                id,
            }
        })
        .collect())
}
