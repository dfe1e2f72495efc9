//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own station database and one
//! worker thread per station. Dropping the server shuts everything down.

use super::constants::*;
use super::fixtures::insert_song;
use radio_scheduler::catalog::{CatalogSnapshot, SnapshotCache, SqliteCatalogStore};
use radio_scheduler::config::StationSettings;
use radio_scheduler::server::{make_app, metrics, RequestsLoggingLevel, ServerState};
use radio_scheduler::station::{spawn_station, StationNotifier, StationScheduler};
use radio_scheduler::storage::SqliteStorage;
use rusqlite::Connection;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

const BUSY_TIMEOUT: Duration = Duration::from_millis(200);

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub db_path: PathBuf,

    client: reqwest::Client,

    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server for `STATION_ID` and `OTHER_STATION_ID` on a random port.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Like `spawn`, running `seed` against the database after the default
    /// songs are inserted and before the stations load.
    pub async fn spawn_with(seed: impl FnOnce(&Connection)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("radio.db");

        let storage = SqliteStorage::open(&db_path, BUSY_TIMEOUT).expect("Failed to open storage");
        for song_id in STATION_SONGS {
            insert_song(storage.connection(), song_id, STATION_ID);
        }
        insert_song(storage.connection(), OTHER_STATION_SONG, OTHER_STATION_ID);
        seed(storage.connection());

        let snapshot = CatalogSnapshot::load(
            &SqliteCatalogStore::new(storage.connection()),
            chrono::Utc::now().timestamp(),
        )
        .expect("Failed to load snapshot");
        let cache = Arc::new(SnapshotCache::new(snapshot));
        drop(storage);

        metrics::init_metrics();
        let notifier = StationNotifier::default();
        let mut handles = Vec::new();
        for sid in [STATION_ID, OTHER_STATION_ID] {
            let storage =
                SqliteStorage::open(&db_path, BUSY_TIMEOUT).expect("Failed to open storage");
            let scheduler = StationScheduler::load(
                StationSettings::new(sid, PAUSE_FILE),
                storage,
                cache.clone(),
                notifier.clone(),
            )
            .expect("Failed to load station");
            let (handle, _thread) = spawn_station(scheduler).expect("Failed to spawn station");
            handles.push(handle);
        }

        let app = make_app(ServerState::new(handles, RequestsLoggingLevel::None));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr: SocketAddr = listener.local_addr().expect("Failed to get local address");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let base_url = format!("http://{}", addr);
        wait_for_ready(&base_url).await;

        TestServer {
            base_url,
            db_path,
            client: reqwest::Client::new(),
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Opens a side connection to the station database.
    pub fn connection(&self) -> Connection {
        Connection::open(&self.db_path).expect("Failed to open side connection")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn advance(&self, sid: u32) -> reqwest::Response {
        self.get(&format!("/advance/{}", sid)).await
    }

    pub async fn advance_body(&self, sid: u32) -> String {
        let response = self.advance(sid).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        response.text().await.expect("Failed to read body")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn wait_for_ready(base_url: &str) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client.get(base_url).send().await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Server at {} did not become ready", base_url);
}
