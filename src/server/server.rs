use anyhow::{Context, Result};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use super::metrics::metrics_handler;
use super::{log_requests, state::ServerState, RequestsLoggingLevel};
use crate::station::{StationError, StationHandle};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub stations: Vec<u32>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let mut stations: Vec<u32> = state.stations.keys().copied().collect();
    stations.sort_unstable();
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        stations,
    })
}

fn unknown_station(sid: u32) -> Response {
    (StatusCode::NOT_FOUND, format!("Unknown station {}", sid)).into_response()
}

fn station_error_response(sid: u32, err: StationError) -> Response {
    if err.is_retryable() {
        warn!("Station {} busy: {}", sid, err);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "1")],
            "Storage busy, retry shortly",
        )
            .into_response();
    }
    error!("Station {} request failed: {}", sid, err);
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

fn with_station<'a>(state: &'a ServerState, sid: u32) -> Result<&'a StationHandle, Response> {
    state.station(sid).ok_or_else(|| unknown_station(sid))
}

async fn advance_station(State(state): State<ServerState>, Path(sid): Path<u32>) -> Response {
    let handle = match with_station(&state, sid) {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    let now = chrono::Utc::now().timestamp();
    match handle.advance(now).await {
        Ok(outcome) => (StatusCode::OK, outcome.body).into_response(),
        Err(err) => station_error_response(sid, err),
    }
}

async fn get_song_standing(
    State(state): State<ServerState>,
    Path((sid, song_id)): Path<(u32, i64)>,
) -> Response {
    let handle = match with_station(&state, sid) {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    match handle.song_standing(song_id).await {
        Ok(Some(standing)) => Json(json!({
            "song_id": song_id,
            "rating_rank": standing.rating_rank,
            "rating_rank_percentile": standing.rating_rank_percentile,
            "album_available_at": standing.album_available_at,
        }))
        .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => station_error_response(sid, err),
    }
}

async fn post_song_ratings(
    State(state): State<ServerState>,
    Path((sid, song_id)): Path<(u32, i64)>,
) -> Response {
    let handle = match with_station(&state, sid) {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    match handle.update_ratings(song_id).await {
        Ok(Some(update)) => Json(json!({
            "song_id": song_id,
            "rating": update.song.rating,
            "rating_count": update.song.count,
            "album": update.album.map(|(album_id, summary)| json!({
                "album_id": album_id,
                "rating": summary.rating,
                "rating_count": summary.count,
            })),
        }))
        .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => station_error_response(sid, err),
    }
}

pub fn make_app(state: ServerState) -> Router {
    let station_routes: Router = Router::new()
        .route("/advance/{sid}", get(advance_station))
        .route(
            "/stations/{sid}/songs/{song_id}/standing",
            get(get_song_standing),
        )
        .route(
            "/stations/{sid}/songs/{song_id}/ratings",
            post(post_song_ratings),
        )
        .with_state(state.clone());

    Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .merge(station_routes)
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    stations: Vec<StationHandle>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = make_app(ServerState::new(stations, requests_logging_level));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SnapshotCache;
    use crate::config::StationSettings;
    use crate::station::{spawn_station, StationNotifier, StationScheduler};
    use crate::storage::test_db::insert_song;
    use crate::storage::SqliteStorage;
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt; // for `oneshot`

    fn app(dir: &TempDir) -> Router {
        let storage =
            SqliteStorage::open(dir.path().join("radio.db"), Duration::from_millis(50)).unwrap();
        insert_song(storage.connection(), 1, 1, 100, None);
        let scheduler = StationScheduler::load(
            StationSettings::new(1, "/pause.mp3"),
            storage,
            Arc::new(SnapshotCache::default()),
            StationNotifier::default(),
        )
        .unwrap();
        let (handle, _thread) = spawn_station(scheduler).unwrap();
        make_app(ServerState::new([handle], RequestsLoggingLevel::None))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn uptime_is_formatted() {
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[tokio::test]
    async fn advance_returns_filename() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let request = Request::builder()
            .uri("/advance/1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "/music/1.mp3");
    }

    #[tokio::test]
    async fn unknown_station_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        for uri in ["/advance/9", "/stations/9/songs/1/standing"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[tokio::test]
    async fn metrics_are_served() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
