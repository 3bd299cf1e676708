//! Status aggregation
//!
//! Combines playback state reported by the playback engine, per-list
//! `refreshed` values from the ListStore and a short-lived cluster view.
//!
//! Cluster visibility is a two-state machine checked lazily on every read:
//! `Absent --(interest signal)--> Fresh --(TTL elapses)--> Absent`.
//! Repeated interest signals keep it Fresh by resetting `last_seen`.

use crate::store::ListStore;
use rame_common::events::{EventBus, ListEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Playback state as reported by the playback engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Current playback cursor; serializes as `{}` when nothing is selected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
}

/// Body of a status poll; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusRequest {
    /// Lists whose `refreshed` value the caller wants
    #[serde(default)]
    pub lists: Option<Vec<String>>,
    /// Cluster interest signal
    #[serde(default)]
    pub cluster: Option<bool>,
}

impl StatusRequest {
    pub fn wants_cluster(&self) -> bool {
        self.cluster.unwrap_or(false)
    }
}

/// Cluster view while fresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
    pub controller: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub state: PlaybackState,
    pub position: f64,
    pub lists_refreshed: BTreeMap<String, i64>,
    pub cursor: Cursor,
    /// Omitted entirely once stale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterStatus>,
}

#[derive(Debug, Clone)]
struct ClusterInfo {
    controller: String,
    last_seen: Instant,
}

#[derive(Debug, Default)]
struct Playback {
    state: PlaybackState,
    position: f64,
    cursor: Cursor,
}

/// Aggregates the status reported by `POST /status`
pub struct StatusAggregator {
    store: Arc<ListStore>,
    event_bus: EventBus,
    node_name: String,
    ttl: Duration,
    playback: RwLock<Playback>,
    cluster: Mutex<Option<ClusterInfo>>,
}

impl StatusAggregator {
    pub fn new(store: Arc<ListStore>, event_bus: EventBus, node_name: String, ttl: Duration) -> Self {
        Self {
            store,
            event_bus,
            node_name,
            ttl,
            playback: RwLock::new(Playback::default()),
            cluster: Mutex::new(None),
        }
    }

    /// Record the playback engine's state and position (seconds)
    pub async fn set_playback(&self, state: PlaybackState, position: f64) {
        let mut playback = self.playback.write().await;
        playback.state = state;
        playback.position = if position.is_finite() { position.max(0.0) } else { 0.0 };
        debug!(state = ?state, position = playback.position, "Playback updated");
    }

    pub async fn set_cursor(&self, cursor: Cursor) {
        self.playback.write().await.cursor = cursor;
    }

    /// Answer a status poll
    pub async fn status(&self, request: &StatusRequest) -> StatusResponse {
        self.status_at(request, Instant::now()).await
    }

    /// Answer a status poll as of `now`
    pub async fn status_at(&self, request: &StatusRequest, now: Instant) -> StatusResponse {
        let cluster = self.cluster_at(request.wants_cluster(), now).await;

        let mut lists_refreshed = BTreeMap::new();
        for id in request.lists.iter().flatten() {
            let refreshed = self.store.refreshed(id).await.unwrap_or(0);
            lists_refreshed.insert(id.clone(), refreshed);
        }

        let playback = self.playback.read().await;
        StatusResponse {
            state: playback.state,
            position: playback.position,
            lists_refreshed,
            cursor: playback.cursor.clone(),
            cluster,
        }
    }

    /// Cluster view after applying an optional interest signal at `now`
    ///
    /// Expiry and refresh happen under one lock so a concurrent signal can
    /// never be lost to an expiry check.
    async fn cluster_at(&self, interest: bool, now: Instant) -> Option<ClusterStatus> {
        let mut cluster = self.cluster.lock().await;

        let expired = cluster
            .as_ref()
            .is_some_and(|info| now.saturating_duration_since(info.last_seen) > self.ttl);
        if expired {
            *cluster = None;
            if !interest {
                info!("Cluster information expired");
                self.event_bus
                    .emit_lossy(ListEvent::ClusterChanged { controller: None });
            }
        }

        if interest {
            match cluster.as_mut() {
                Some(info) => info.last_seen = info.last_seen.max(now),
                None => {
                    let info = ClusterInfo {
                        controller: self.node_name.clone(),
                        last_seen: now,
                    };
                    if !expired {
                        info!(controller = %info.controller, "Cluster information fresh");
                        self.event_bus.emit_lossy(ListEvent::ClusterChanged {
                            controller: Some(info.controller.clone()),
                        });
                    }
                    *cluster = Some(info);
                }
            }
        }

        cluster.as_ref().map(|info| ClusterStatus {
            controller: info.controller.clone(),
        })
    }
}

impl std::fmt::Debug for StatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAggregator")
            .field("node_name", &self.node_name)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_millis(3000);

    fn aggregator() -> (Arc<ListStore>, StatusAggregator) {
        let store = Arc::new(ListStore::new(0));
        let status = StatusAggregator::new(store.clone(), EventBus::new(16), "rame-1".into(), TTL);
        (store, status)
    }

    fn lists(ids: &[&str]) -> StatusRequest {
        StatusRequest {
            lists: Some(ids.iter().map(|id| id.to_string()).collect()),
            cluster: None,
        }
    }

    fn interest() -> StatusRequest {
        StatusRequest {
            lists: None,
            cluster: Some(true),
        }
    }

    #[tokio::test]
    async fn test_idle_status() {
        let (store, status) = aggregator();
        store.register_storage("rame", "Rame", 0).await.unwrap();

        let response = status.status(&lists(&["root", "rame"])).await;
        assert_eq!(response.state, PlaybackState::Stopped);
        assert_eq!(response.position, 0.0);
        assert_eq!(response.lists_refreshed.get("root"), Some(&0));
        assert_eq!(response.lists_refreshed.get("rame"), Some(&0));
        assert!(response.cluster.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "state": "stopped",
                "position": 0.0,
                "listsRefreshed": {"rame": 0, "root": 0},
                "cursor": {}
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_lists_report_zero() {
        let (store, status) = aggregator();
        let list = store.create(vec![], "rame", "p", 1234).await.unwrap();

        let response = status.status(&lists(&[&list.id, "missing"])).await;
        assert_eq!(response.lists_refreshed[&list.id], 1234);
        assert_eq!(response.lists_refreshed["missing"], 0);
    }

    #[tokio::test]
    async fn test_cluster_visible_until_ttl_elapses() {
        let (_store, status) = aggregator();
        let t0 = Instant::now();

        let fresh = status.status_at(&interest(), t0).await;
        assert_eq!(
            fresh.cluster,
            Some(ClusterStatus {
                controller: "rame-1".into()
            })
        );

        let before = status
            .status_at(&StatusRequest::default(), t0 + TTL - Duration::from_millis(1))
            .await;
        assert!(before.cluster.is_some());

        let after = status
            .status_at(&StatusRequest::default(), t0 + TTL + Duration::from_millis(1))
            .await;
        assert!(after.cluster.is_none());
        let json = serde_json::to_value(&after).unwrap();
        assert!(json.get("cluster").is_none());
    }

    #[tokio::test]
    async fn test_interest_signal_rearms_ttl() {
        let (_store, status) = aggregator();
        let t0 = Instant::now();

        status.status_at(&interest(), t0).await;
        status.status_at(&interest(), t0 + Duration::from_millis(2000)).await;

        let later = status
            .status_at(&StatusRequest::default(), t0 + Duration::from_millis(4500))
            .await;
        assert!(later.cluster.is_some());

        let expired = status
            .status_at(&StatusRequest::default(), t0 + Duration::from_millis(5001))
            .await;
        assert!(expired.cluster.is_none());
    }

    #[tokio::test]
    async fn test_signal_after_expiry_is_fresh_again() {
        let (_store, status) = aggregator();
        let t0 = Instant::now();

        status.status_at(&interest(), t0).await;
        let again = status.status_at(&interest(), t0 + Duration::from_secs(10)).await;
        assert!(again.cluster.is_some());
        let follow = status
            .status_at(&StatusRequest::default(), t0 + Duration::from_secs(12))
            .await;
        assert!(follow.cluster.is_some());
    }

    #[tokio::test]
    async fn test_cluster_change_events() {
        let store = Arc::new(ListStore::new(0));
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let status = StatusAggregator::new(store, bus, "rame-1".into(), TTL);
        let t0 = Instant::now();

        status.status_at(&interest(), t0).await;
        status.status_at(&interest(), t0 + Duration::from_millis(100)).await;
        status
            .status_at(&StatusRequest::default(), t0 + Duration::from_secs(5))
            .await;

        assert_eq!(
            rx.try_recv().unwrap(),
            ListEvent::ClusterChanged {
                controller: Some("rame-1".into())
            }
        );
        assert_eq!(rx.try_recv().unwrap(), ListEvent::ClusterChanged { controller: None });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_playback_and_cursor() {
        let (_store, status) = aggregator();
        status.set_playback(PlaybackState::Playing, 12.5).await;
        status
            .set_cursor(Cursor {
                list: Some("p1".into()),
                item: Some("i1".into()),
            })
            .await;

        let response = status.status(&StatusRequest::default()).await;
        assert_eq!(response.state, PlaybackState::Playing);
        assert_eq!(response.position, 12.5);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["state"], "playing");
        assert_eq!(json["cursor"], serde_json::json!({"list": "p1", "item": "i1"}));

        status.set_playback(PlaybackState::Paused, -3.0).await;
        assert_eq!(status.status(&StatusRequest::default()).await.position, 0.0);
    }

    #[test]
    fn test_request_parsing() {
        let request: StatusRequest = serde_json::from_str(r#"{"lists":["root"]}"#).unwrap();
        assert_eq!(request.lists, Some(vec!["root".to_string()]));
        assert!(!request.wants_cluster());

        let request: StatusRequest = serde_json::from_str(r#"{"cluster":true}"#).unwrap();
        assert!(request.wants_cluster());

        let request: StatusRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, StatusRequest::default());
    }
}
