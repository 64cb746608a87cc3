use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;

#[derive(Deserialize)]
pub struct TrainQuery {
    route: Option<String>,
}

/// GET /api/trains: every reconciled train, optionally for one route.
pub async fn get_trains(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrainQuery>,
) -> impl IntoResponse {
    let snapshot = state.snapshot.load();
    let trains = snapshot.trains(params.route.as_deref());

    Json(json!({
        "success": true,
        "count": trains.len(),
        "trains": trains,
        "fetched_at": snapshot.fetched_at,
    }))
}

/// GET /api/trains/{trip_id}: one train by trip id.
pub async fn get_train(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> impl IntoResponse {
    let snapshot = state.snapshot.load();

    match snapshot.find_trip(&trip_id) {
        Some(train) => (
            StatusCode::OK,
            Json(json!({ "success": true, "train": train })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "error": format!("Trip '{}' not in the current feeds", trip_id),
            })),
        ),
    }
}

/// GET /api/status: configured routes and feeds, current train count.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.load();
    let snapshot = state.snapshot.load();

    Json(json!({
        "success": true,
        "status": {
            "routes": config.routes,
            "feeds": config.feed_urls,
            "refresh_interval": config.refresh.trains_interval,
            "train_count": snapshot.train_count(),
            "feeds_loaded": snapshot.feeds.len(),
            "oldest_feed_timestamp": snapshot.oldest_feed_timestamp(),
            "fetched_at": snapshot.fetched_at,
        }
    }))
}

/// GET /api/healthz: liveness check against the fetch heartbeat.
pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let config = state.config.load();
    let fetch_age = now.saturating_sub(state.last_fetch_success.load(Ordering::Relaxed));
    let stale_threshold = config.refresh.trains_interval * 3;
    let ok = fetch_age <= stale_threshold;
    let reason = (!ok).then(|| format!("fetch stale {}s", fetch_age));

    Json(json!({
        "ok": ok,
        "age_seconds": fetch_age,
        "reason": reason,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::Response;

    use crate::mta::client::positions_from_feed;
    use crate::mta::index::tests::{feed, trip, update_entity, vehicle_entity};
    use crate::tests::make_state;

    fn loaded_state() -> Arc<AppState> {
        let state = make_state();
        let mut snapshot = crate::models::PositionSnapshot::empty();
        snapshot.feeds.insert(
            "feed".to_string(),
            positions_from_feed(&feed(vec![
                vehicle_entity("1", trip("T1", "1"), "101N"),
                update_entity("2", trip("T2", "L"), &["L01N", "L02N"]),
            ])),
        );
        state.snapshot.store(Arc::new(snapshot));
        state
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn trains(state: Arc<AppState>, route: Option<&str>) -> serde_json::Value {
        let query = TrainQuery {
            route: route.map(str::to_string),
        };
        body_json(get_trains(State(state), Query(query)).await.into_response()).await
    }

    #[tokio::test]
    async fn test_get_trains_all() {
        let body = trains(loaded_state(), None).await;
        assert_eq!(body["count"], 2);
        // Sorted by route: "1" before "L"
        assert_eq!(body["trains"][0]["trip_id"], "T1");
        assert_eq!(body["trains"][0]["current_status"], "Unknown");
        assert_eq!(body["trains"][1]["next_stops"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_trains_by_route() {
        let body = trains(loaded_state(), Some("L")).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["trains"][0]["direction"], "Unknown");
        assert_eq!(body["trains"][0]["route_id"], "L");
    }

    #[tokio::test]
    async fn test_get_train_found_and_missing() {
        let resp = get_train(State(loaded_state()), Path("T1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["train"]["current_stop_id"], "101N");

        let resp = get_train(State(loaded_state()), Path("NOPE".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let resp = get_status(State(loaded_state())).await.into_response();
        let body = body_json(resp).await;
        assert_eq!(body["status"]["train_count"], 2);
        assert_eq!(body["status"]["feeds_loaded"], 1);
    }

    #[tokio::test]
    async fn test_healthz_stale_without_fetch() {
        let body = body_json(healthz(State(make_state())).await.into_response()).await;
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_healthz_fresh_after_fetch() {
        let state = make_state();
        let now = chrono::Utc::now().timestamp() as u64;
        state.last_fetch_success.store(now, Ordering::Relaxed);
        let body = body_json(healthz(State(state)).await.into_response()).await;
        assert_eq!(body["ok"], true);
    }
}
