//! One OS thread per station.
//!
//! The worker owns the station's [`StationScheduler`] and handles commands
//! one at a time, so advances of a station never overlap. Async callers
//! talk to it through a [`StationHandle`].

use super::advance::{AdvanceOutcome, RatingUpdate, StationScheduler};
use super::notifier::StationNotifier;
use super::StationError;
use crate::catalog::{SnapshotCache, SongStanding};
use crate::config::StationSettings;
use crate::schedule::ScheduleError;
use crate::storage::SqliteStorage;
use anyhow::{bail, Context};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

const COMMAND_QUEUE_SIZE: usize = 16;

pub enum StationCommand {
    Advance {
        now: i64,
        reply: oneshot::Sender<Result<AdvanceOutcome, ScheduleError>>,
    },
    SongStanding {
        song_id: i64,
        reply: oneshot::Sender<anyhow::Result<Option<SongStanding>>>,
    },
    UpdateRatings {
        song_id: i64,
        reply: oneshot::Sender<anyhow::Result<Option<RatingUpdate>>>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct StationHandle {
    sid: u32,
    sender: mpsc::Sender<StationCommand>,
}

impl StationHandle {
    pub fn sid(&self) -> u32 {
        self.sid
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> StationCommand,
    ) -> Result<T, StationError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| StationError::WorkerGone(self.sid))?;
        response.await.map_err(|_| StationError::WorkerGone(self.sid))
    }

    pub async fn advance(&self, now: i64) -> Result<AdvanceOutcome, StationError> {
        Ok(self
            .request(|reply| StationCommand::Advance { now, reply })
            .await??)
    }

    pub async fn song_standing(&self, song_id: i64) -> Result<Option<SongStanding>, StationError> {
        Ok(self
            .request(|reply| StationCommand::SongStanding { song_id, reply })
            .await??)
    }

    pub async fn update_ratings(&self, song_id: i64) -> Result<Option<RatingUpdate>, StationError> {
        Ok(self
            .request(|reply| StationCommand::UpdateRatings { song_id, reply })
            .await??)
    }

    /// Asks the worker to exit after the commands already queued.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(StationCommand::Shutdown).await;
    }
}

/// Starts the worker thread for `scheduler`'s station.
pub fn spawn_station(scheduler: StationScheduler) -> anyhow::Result<(StationHandle, JoinHandle<()>)> {
    let sid = scheduler.sid();
    let (sender, receiver) = mpsc::channel(COMMAND_QUEUE_SIZE);
    let thread = std::thread::Builder::new()
        .name(format!("station-{}", sid))
        .spawn(move || run_worker(scheduler, receiver))
        .with_context(|| format!("Failed to start worker for station {}", sid))?;
    Ok((StationHandle { sid, sender }, thread))
}

/// Loads and starts a worker for every station in `stations`.
///
/// A station whose storage or schedule cannot be loaded is logged and left
/// out so the others keep serving. Fails only when no station starts.
pub fn spawn_stations(
    stations: &[StationSettings],
    db_path: &Path,
    busy_timeout: Duration,
    snapshot: Arc<SnapshotCache>,
    notifier: &StationNotifier,
) -> anyhow::Result<Vec<(StationHandle, JoinHandle<()>)>> {
    let mut started = Vec::with_capacity(stations.len());
    for settings in stations {
        let sid = settings.sid;
        let loaded = SqliteStorage::open(db_path, busy_timeout).and_then(|storage| {
            StationScheduler::load(settings.clone(), storage, snapshot.clone(), notifier.clone())
                .map_err(anyhow::Error::from)
        });
        match loaded {
            Ok(scheduler) => started.push(spawn_station(scheduler)?),
            Err(e) => error!("Station {} failed to load and will not serve: {:#}", sid, e),
        }
    }
    if started.is_empty() && !stations.is_empty() {
        bail!("None of the {} configured stations could be loaded", stations.len());
    }
    Ok(started)
}

fn run_worker(mut scheduler: StationScheduler, mut receiver: mpsc::Receiver<StationCommand>) {
    let sid = scheduler.sid();
    info!("Station {} worker started", sid);
    while let Some(command) = receiver.blocking_recv() {
        match command {
            StationCommand::Advance { now, reply } => {
                let result = scheduler.advance(now);
                let fatal = matches!(&result, Err(e) if e.is_fatal());
                let _ = reply.send(result);
                if fatal {
                    error!("Station {} worker stopping on invalid schedule state", sid);
                    break;
                }
            }
            StationCommand::SongStanding { song_id, reply } => {
                let _ = reply.send(scheduler.song_standing(song_id));
            }
            StationCommand::UpdateRatings { song_id, reply } => {
                let _ = reply.send(scheduler.update_ratings(song_id));
            }
            StationCommand::Shutdown => break,
        }
    }
    info!("Station {} worker exited", sid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CandidateFilter;
    use crate::schedule::{
        Crossfade, ElectionFlavor, NewProducer, ProducerKind, ProducerState, ScheduleStore,
        SqliteScheduleStore,
    };
    use crate::station::advance::PlaySource;
    use crate::storage::test_db::insert_song;
    use tempfile::TempDir;

    fn spawn(dir: &TempDir) -> (StationHandle, JoinHandle<()>) {
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
        spawn_station(scheduler).unwrap()
    }

    #[tokio::test]
    async fn broken_station_does_not_stop_the_others() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("radio.db");
        {
            let storage = SqliteStorage::open(&db_path, Duration::from_millis(50)).unwrap();
            let conn = storage.connection();
            insert_song(conn, 1, 1, 100, None);
            // Station 2 has a current election producer without an election.
            let store = SqliteScheduleStore::new(conn);
            let id = store
                .insert_producer(&NewProducer {
                    sid: 2,
                    kind: ProducerKind::Election {
                        flavor: ElectionFlavor::General,
                        filter: CandidateFilter::default(),
                    },
                    name: None,
                    start: 0,
                    end: 10_000,
                    use_crossfade: Crossfade::On,
                    use_tag_suffix: true,
                    is_filler: true,
                })
                .unwrap();
            store
                .update_producer(id, ProducerState::Current, 0, 10_000)
                .unwrap();
        }
        let stations = [
            StationSettings::new(1, "/pause.mp3"),
            StationSettings::new(2, "/pause.mp3"),
        ];

        let started = spawn_stations(
            &stations,
            &db_path,
            Duration::from_millis(50),
            Arc::new(SnapshotCache::default()),
            &StationNotifier::default(),
        )
        .unwrap();
        assert_eq!(
            started.iter().map(|(h, _)| h.sid()).collect::<Vec<_>>(),
            vec![1]
        );
        let outcome = started[0].0.advance(1_000_000).await.unwrap();
        assert_eq!(outcome.source, PlaySource::Song(1));

        let err = spawn_stations(
            &stations[1..],
            &db_path,
            Duration::from_millis(50),
            Arc::new(SnapshotCache::default()),
            &StationNotifier::default(),
        );
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn handle_round_trips_through_worker() {
        let dir = TempDir::new().unwrap();
        let (handle, thread) = spawn(&dir);

        let outcome = handle.advance(1_000_000).await.unwrap();
        assert_eq!(outcome.source, PlaySource::Song(1));
        assert_eq!(handle.song_standing(1).await.unwrap(), None);

        handle.shutdown().await;
        tokio::task::spawn_blocking(move || thread.join().unwrap())
            .await
            .unwrap();
        assert!(matches!(
            handle.advance(1_000_100).await,
            Err(StationError::WorkerGone(1))
        ));
    }
}
