//! HTTP API handlers for rame-server
//!
//! JSON over HTTP for lists and status, plus an SSE stream of list events.

pub mod health;
pub mod lists;
pub mod sse;
pub mod status;

pub use health::health_routes;
pub use lists::list_routes;
pub use sse::event_stream;
pub use status::status_routes;

use crate::error::ApiError;
use serde::de::DeserializeOwned;

/// Parse a JSON request body; an empty body means `T::default()`
pub(crate) fn parse_body<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("malformed JSON body: {}", e)))
}
