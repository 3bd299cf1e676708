//! POST /status

use axum::{body::Bytes, extract::State, routing::post, Json, Router};

use crate::{
    error::ApiResult,
    status::{StatusRequest, StatusResponse},
    AppState,
};

/// POST /status
///
/// Body is optional: `{lists: [...]}` and/or `{cluster: true}`.
pub async fn get_status(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StatusResponse>> {
    let request: StatusRequest = super::parse_body(&body)?;
    Ok(Json(state.library.status().status(&request).await))
}

pub fn status_routes() -> Router<AppState> {
    Router::new().route("/status", post(get_status))
}
