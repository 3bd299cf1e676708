//! Integration tests for the rame-server HTTP API
//!
//! Drives the router with `oneshot` against tempdir storages and a probe
//! that answers from a fixed table.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rame_common::events::EventBus;
use rame_server::probe::{MediaProbe, ProbeError, ProbeResult};
use rame_server::scanner::ScanSettings;
use rame_server::storage::{LocalStorage, StorageRegistry};
use rame_server::{AppState, Library, LibrarySettings};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

/// Probe returning canned metadata by file name
struct TableProbe;

#[async_trait]
impl MediaProbe for TableProbe {
    async fn probe(&self, location: &str) -> Result<ProbeResult, ProbeError> {
        let name = location.rsplit('/').next().unwrap_or(location);
        let (title, secs) = match name {
            "blue_screen.mp4" => (Some("Blüe Screen"), 3),
            "green_screen.mp4" => (Some("Green Screen"), 2),
            "red_screen.mp4" => (Some("Red Screen"), 4),
            _ => return Err(ProbeError::Unreadable(format!("no media at {}", location))),
        };
        Ok(ProbeResult {
            title: title.map(str::to_string),
            duration: Duration::from_secs(secs),
        })
    }
}

/// Storage "rame" holding `internal/{blue,green,red}_screen.mp4`
fn create_test_storage() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let internal = dir.path().join("internal");
    std::fs::create_dir(&internal).unwrap();
    for name in ["blue_screen.mp4", "green_screen.mp4", "red_screen.mp4"] {
        std::fs::write(internal.join(name), b"fake media").unwrap();
    }
    dir
}

async fn create_test_app(
    dir: &std::path::Path,
    cluster_ttl: Duration,
    pool: Option<sqlx::SqlitePool>,
) -> Router {
    let mut storages = StorageRegistry::new();
    storages.insert(Arc::new(LocalStorage::new("rame", "Rame", dir)));

    let settings = LibrarySettings {
        scan: ScanSettings::default(),
        node_name: "rame-test".to_string(),
        cluster_ttl,
    };
    let library = Library::new(settings, storages, Arc::new(TableProbe), EventBus::new(100), pool)
        .await
        .expect("Failed to build library");

    rame_server::build_router(AppState::new(Arc::new(library)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get(app: &Router, uri: &str) -> Value {
    let (status, json) = send(app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK, "GET {} -> {}", uri, json);
    json
}

/// Poll a list until every regular item carries a duration
async fn poll_until_resolved(app: &Router, uri: &str) -> Value {
    for _ in 0..100 {
        let list = get(app, uri).await;
        let items = list["items"].as_array().unwrap();
        if !items.is_empty() && items.iter().all(|item| item.get("duration").is_some()) {
            return list;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never resolved", uri);
}

#[tokio::test]
async fn test_root_lists_storages() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let root = get(&app, "/lists/root").await;
    assert_eq!(root["id"], "root");
    assert_eq!(root["title"], "Root");
    assert_eq!(root["type"], "directory");
    assert!(root["refreshed"].is_number());
    assert_eq!(root["items"][0]["id"], "rame");
    assert_eq!(root["items"][0]["type"], "storage");
}

#[tokio::test]
async fn test_storage_and_directory_scan() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let rame = get(&app, "/lists/rame").await;
    assert_eq!(rame["type"], "storage");
    assert_eq!(rame["editable"], false);
    let internal_id = rame["items"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(rame["items"][0]["type"], "directory");

    let uri = format!("/lists/{}", internal_id);
    let first = get(&app, &uri).await;
    let first_refreshed = first["refreshed"].as_i64().unwrap();

    let internal = poll_until_resolved(&app, &uri).await;
    assert!(internal["refreshed"].as_i64().unwrap() > first_refreshed);
    assert_eq!(
        internal["items"][0],
        json!({
            "id": internal["items"][0]["id"],
            "name": "blue_screen.mp4",
            "title": "Blüe Screen",
            "type": "regular",
            "uri": "internal/blue_screen.mp4",
            "duration": 3
        })
    );
    assert_eq!(internal["items"][1]["duration"], 2);
    assert_eq!(internal["items"][2]["duration"], 4);

    // Resolved lists are served from cache
    let again = get(&app, &uri).await;
    assert_eq!(again["refreshed"], internal["refreshed"]);
}

#[tokio::test]
async fn test_playlist_lifecycle() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let (status, created) = send(
        &app,
        Method::POST,
        "/lists/",
        Some(json!({
            "items": [
                {"uri": "internal/blue_screen.mp4", "title": "My Blue"},
                {"uri": "internal/green_screen.mp4"},
                {"uri": "internal/red_screen.mp4"}
            ],
            "storage": "rame",
            "title": "Frisby test"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["type"], "playlist");
    assert_eq!(created["title"], "Frisby test");
    assert!(created["refreshed"].is_number());
    let id = created["id"].as_str().unwrap().to_string();

    let uri = format!("/lists/{}", id);
    let playlist = poll_until_resolved(&app, &uri).await;
    assert_eq!(playlist["editable"], true);
    assert_eq!(playlist["items"].as_array().unwrap().len(), 3);
    assert_eq!(playlist["items"][0]["name"], "blue_screen.mp4");
    assert_eq!(playlist["items"][0]["title"], "My Blue");
    assert_eq!(playlist["items"][1]["title"], "Green Screen");
    assert_eq!(playlist["items"][2]["type"], "regular");

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_without_trailing_slash() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let (status, created) = send(
        &app,
        Method::POST,
        "/lists",
        Some(json!({"items": [], "storage": "rame", "title": "Empty"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["items"], json!([]));
}

#[tokio::test]
async fn test_invalid_operations() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let (status, body) = send(&app, Method::DELETE, "/lists/rame", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_OPERATION");

    let (status, _) = send(&app, Method::DELETE, "/lists/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        "/lists",
        Some(json!({"items": [{"uri": ""}], "storage": "rame", "title": "Bad"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/lists",
        Some(json!({"items": [], "storage": "usb", "title": "Elsewhere"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/lists")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_without_cluster_interest() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let (status, body) = send(&app, Method::POST, "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["position"], 0.0);
    assert_eq!(body["cursor"], json!({}));
    assert!(body.get("cluster").is_none());

    let (_, body) = send(
        &app,
        Method::POST,
        "/status",
        Some(json!({"lists": ["root", "rame", "missing"]})),
    )
    .await;
    assert!(body["listsRefreshed"]["root"].is_number());
    assert!(body["listsRefreshed"]["rame"].is_number());
    assert_eq!(body["listsRefreshed"]["missing"], 0);
}

#[tokio::test]
async fn test_cluster_expires_after_ttl() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_millis(200), None).await;

    let (_, body) = send(&app, Method::POST, "/status", Some(json!({"cluster": true}))).await;
    assert_eq!(body["cluster"]["controller"], "rame-test");

    let (_, body) = send(&app, Method::POST, "/status", None).await;
    assert_eq!(body["cluster"]["controller"], "rame-test");

    tokio::time::sleep(Duration::from_millis(350)).await;
    let (_, body) = send(&app, Method::POST, "/status", None).await;
    assert!(body.get("cluster").is_none());
}

#[tokio::test]
async fn test_rescan_endpoint() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let rame = get(&app, "/lists/rame").await;
    assert_eq!(rame["items"].as_array().unwrap().len(), 1);

    std::fs::write(dir.path().join("red_screen.mp4"), b"fake media").unwrap();
    let (status, rescanned) = send(&app, Method::POST, "/lists/rame/scan", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rescanned["items"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::POST, "/lists/missing/scan", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rescan_wait_answers_after_scan() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let internal = get(&app, "/lists/rame").await["items"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/lists/{}/scan?wait=true", internal);
    let (status, scanned) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let items = scanned["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item.get("duration").is_some()));
    let blue = items.iter().find(|i| i["name"] == "blue_screen.mp4").unwrap();
    assert_eq!(blue["title"], "Blüe Screen");
    assert_eq!(blue["duration"], 3);
}

#[tokio::test]
async fn test_playlists_persist_across_restart() {
    let dir = create_test_storage();
    let pool = rame_common::db::init_memory_database().await.unwrap();

    let app = create_test_app(dir.path(), Duration::from_secs(3), Some(pool.clone())).await;
    let (_, created) = send(
        &app,
        Method::POST,
        "/lists/",
        Some(json!({
            "items": [{"uri": "internal/blue_screen.mp4"}, {"uri": "internal/red_screen.mp4"}],
            "storage": "rame",
            "title": "Kept"
        })),
    )
    .await;
    let uri = format!("/lists/{}", created["id"].as_str().unwrap());
    let before = poll_until_resolved(&app, &uri).await;

    let restarted = create_test_app(dir.path(), Duration::from_secs(3), Some(pool)).await;
    let after = poll_until_resolved(&restarted, &uri).await;

    assert_eq!(after["title"], "Kept");
    for (old, new) in before["items"]
        .as_array()
        .unwrap()
        .iter()
        .zip(after["items"].as_array().unwrap())
    {
        assert_eq!(old["id"], new["id"]);
        assert_eq!(old["title"], new["title"]);
        assert_eq!(old["type"], new["type"]);
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = create_test_storage();
    let app = create_test_app(dir.path(), Duration::from_secs(3), None).await;

    let body = get(&app, "/health").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "rame-server");
    assert!(body["uptime_seconds"].is_number());
}
