//! List API handlers
//!
//! GET /lists/:id, POST /lists, DELETE /lists/:id, POST /lists/:id/scan[?wait=true]

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use rame_common::model::{Item, ItemKind, ItemSpec, List, ListKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ApiResult, library::NewPlaylist, AppState};

/// Item as returned to clients
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemResponse {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Whole seconds; absent until probed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            title: item.title,
            kind: item.kind,
            uri: item.uri,
            duration: item.duration,
        }
    }
}

/// List as returned to clients
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ListResponse {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ListKind,
    pub editable: bool,
    pub refreshed: i64,
    pub items: Vec<ItemResponse>,
}

impl From<List> for ListResponse {
    fn from(list: List) -> Self {
        Self {
            editable: list.editable(),
            id: list.id,
            title: list.title,
            kind: list.kind,
            refreshed: list.refreshed,
            items: list.items.into_iter().map(ItemResponse::from).collect(),
        }
    }
}

/// POST /lists request
#[derive(Debug, Default, Deserialize)]
pub struct CreatePlaylistRequest {
    #[serde(default)]
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub storage: String,
    #[serde(default)]
    pub title: String,
}

/// DELETE /lists/:id response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteListResponse {
    pub status: String,
    pub id: String,
}

/// GET /lists/:id
///
/// Returns the current snapshot; unresolved lists start scanning in the
/// background and clients poll until `refreshed` advances.
pub async fn get_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ListResponse>> {
    let list = state.library.get_list(&id).await?;
    debug!(list_id = %id, items = list.items.len(), refreshed = list.refreshed, "Get list");
    Ok(Json(list.into()))
}

/// POST /lists
pub async fn create_playlist(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ListResponse>> {
    let request: CreatePlaylistRequest = super::parse_body(&body)?;
    let list = state
        .library
        .create_playlist(NewPlaylist {
            items: request.items,
            storage: request.storage,
            title: request.title,
        })
        .await?;
    Ok(Json(list.into()))
}

/// DELETE /lists/:id
pub async fn delete_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteListResponse>> {
    state.library.delete_playlist(&id).await?;
    Ok(Json(DeleteListResponse {
        status: "ok".to_string(),
        id,
    }))
}

/// POST /lists/:id/scan query parameters
#[derive(Debug, Default, Deserialize)]
pub struct RescanParams {
    /// Answer only once the scan has finished
    #[serde(default)]
    pub wait: bool,
}

/// POST /lists/:id/scan
pub async fn rescan_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<RescanParams>,
) -> ApiResult<Json<ListResponse>> {
    let list = state.library.rescan(&id, params.wait).await?;
    Ok(Json(list.into()))
}

/// Build list routes
pub fn list_routes() -> Router<AppState> {
    Router::new()
        .route("/lists", post(create_playlist))
        .route("/lists/", post(create_playlist))
        .route("/lists/:id", get(get_list).delete(delete_list))
        .route("/lists/:id/scan", post(rescan_list))
}
