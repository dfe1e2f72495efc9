//! The per-station advance loop.
//!
//! Each call to [`StationScheduler::advance`] moves the station forward by
//! exactly one song and returns what the encoder should play next. All
//! schedule writes of a step happen in one immediate transaction; when it
//! fails, the in-memory schedule is put back as it was.

use super::notifier::{NotificationKind, StationNotifier};
use super::state::{StationStateStore, PAUSED_PLAYING, PAUSE_HEARTBEAT_START};
use crate::catalog::rating::{update_album_rating, update_song_rating};
use crate::catalog::reconcile::{reconcile_albums, ReconcileReport};
use crate::catalog::snapshot::song_standing;
use crate::catalog::{
    start_cooldown, CandidateFilter, CatalogStore, RatingSummary, SnapshotCache, SongStanding,
    SqliteCatalogStore,
};
use crate::config::StationSettings;
use crate::schedule::{
    pause_annotation, AdvanceStep, Crossfade, ElectionFlavor, NewProducer, Producer,
    ProducerContext, ProducerKind, ProducerRecord, ProducerState, ScheduleError, ScheduleStore,
    SqliteScheduleStore,
};
use crate::server::metrics;
use crate::storage::SqliteStorage;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// How long a filler election stays open waiting to be played.
const FILLER_WINDOW_SECS: i64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaySource {
    Song(i64),
    /// The station is paused.
    Pause,
    /// Nothing could be scheduled; the pause placeholder stands in.
    Fallback,
}

impl PlaySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaySource::Song(_) => "song",
            PlaySource::Pause => "pause",
            PlaySource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// Filename or annotation string for the encoder.
    pub body: String,
    pub source: PlaySource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingUpdate {
    pub song: RatingSummary,
    pub album: Option<(i64, RatingSummary)>,
}

/// Runs `attempt`; on a storage conflict runs `recover` and tries exactly
/// once more. A second conflict is returned as is.
pub fn retry_on_conflict<S, T>(
    state: &mut S,
    mut attempt: impl FnMut(&mut S) -> Result<T, ScheduleError>,
    recover: impl FnOnce(&mut S) -> Result<(), ScheduleError>,
) -> Result<T, ScheduleError> {
    match attempt(state) {
        Err(e) if e.is_retryable() => {
            debug!("Retrying after {}", e);
            recover(state)?;
            attempt(state)
        }
        other => other,
    }
}

/// Producers of one station that are not archived yet.
#[derive(Debug, Clone, Default)]
struct Schedule {
    current: Option<Producer>,
    upcoming: Vec<Producer>,
}

impl Schedule {
    fn load(
        catalog: &dyn CatalogStore,
        store: &dyn ScheduleStore,
        sid: u32,
    ) -> Result<Self, ScheduleError> {
        let mut schedule = Schedule::default();
        for record in store.active_producers(sid)? {
            let producer = Producer::restore(record, catalog, store)?;
            if producer.state() != ProducerState::Current {
                schedule.upcoming.push(producer);
            } else if let Some(current) = &schedule.current {
                return Err(ScheduleError::invalid_state(format!(
                    "station {} has producers {} and {} both current",
                    sid, current.id, producer.id
                )));
            } else {
                schedule.current = Some(producer);
            }
        }
        Ok(schedule)
    }

    /// Moves to the next song. Returns whether another producer took over.
    fn step(
        &mut self,
        ctx: &ProducerContext<'_>,
        flavor: ElectionFlavor,
    ) -> Result<bool, ScheduleError> {
        if let Some(current) = self.current.as_mut() {
            if current.advance(ctx)? == AdvanceStep::Playing {
                return Ok(false);
            }
        }

        let mut next = self.take_next(ctx, flavor)?;
        check_window(self.current.as_ref(), &next)?;
        if next.state() == ProducerState::Scheduled {
            next.produce(ctx)?;
        }
        if next.advance(ctx)? != AdvanceStep::Playing {
            return Err(ScheduleError::invalid_state(format!(
                "producer {} became current with nothing to play",
                next.id
            )));
        }
        if let Some(mut previous) = self.current.take() {
            previous.archive(ctx.schedule, ctx.now)?;
        }
        debug!("Producer {} is now current on station {}", next.id, ctx.sid);
        self.current = Some(next);
        Ok(true)
    }

    /// Earliest due scheduled producer, else the open filler, else a new one.
    fn take_next(
        &mut self,
        ctx: &ProducerContext<'_>,
        flavor: ElectionFlavor,
    ) -> Result<Producer, ScheduleError> {
        if let Some(inverted) = self.upcoming.iter().find(|p| p.start > p.end) {
            return Err(inverted_window(inverted));
        }
        self.archive_expired(ctx)?;
        self.archive_stale_fillers(ctx)?;
        let due = self
            .upcoming
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_filler && p.is_due(ctx.now))
            .min_by_key(|(_, p)| (p.start, p.id))
            .map(|(index, _)| index);
        match due.or_else(|| self.upcoming.iter().position(|p| p.is_filler)) {
            Some(index) => Ok(self.upcoming.remove(index)),
            None => new_filler(ctx, flavor),
        }
    }

    fn archive_expired(&mut self, ctx: &ProducerContext<'_>) -> Result<(), ScheduleError> {
        let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.upcoming)
            .into_iter()
            .partition(|p| p.is_expired(ctx.now));
        self.upcoming = live;
        for mut producer in expired {
            info!(
                "Skipping producer {} on station {}: its window ended at {}",
                producer.id, ctx.sid, producer.end
            );
            producer.archive(ctx.schedule, ctx.now)?;
        }
        Ok(())
    }

    /// Drops filler elections whose pool holds a song that can no longer
    /// play, so the next filler draws a fresh pool.
    fn archive_stale_fillers(&mut self, ctx: &ProducerContext<'_>) -> Result<(), ScheduleError> {
        let mut index = 0;
        while index < self.upcoming.len() {
            let producer = &self.upcoming[index];
            if producer.is_filler && producer.has_stale_pool(ctx)? {
                let mut stale = self.upcoming.remove(index);
                debug!(
                    "Replacing filler {} on station {}: its pool went stale",
                    stale.id, ctx.sid
                );
                stale.archive(ctx.schedule, ctx.now)?;
            } else {
                index += 1;
            }
        }
        Ok(())
    }

    /// Keeps an election open for listeners to vote on.
    fn ensure_filler(
        &mut self,
        ctx: &ProducerContext<'_>,
        flavor: ElectionFlavor,
    ) -> Result<(), ScheduleError> {
        if self.upcoming.iter().any(|p| p.is_filler) {
            return Ok(());
        }
        let mut filler = new_filler(ctx, flavor)?;
        match filler.produce(ctx) {
            Ok(_) => {}
            Err(ScheduleError::NoEligibleCandidates { sid }) => {
                warn!("No candidates for the next election on station {}", sid);
            }
            Err(e) => return Err(e),
        }
        self.upcoming.push(filler);
        Ok(())
    }
}

fn inverted_window(producer: &Producer) -> ScheduleError {
    ScheduleError::invalid_state(format!(
        "producer {} window is inverted ({} > {})",
        producer.id, producer.start, producer.end
    ))
}

/// Scheduled producers may not end before the one they take over from.
/// Fillers are placed by the loop itself and are not checked.
fn check_window(previous: Option<&Producer>, next: &Producer) -> Result<(), ScheduleError> {
    if next.start > next.end {
        return Err(inverted_window(next));
    }
    match previous {
        Some(previous) if !previous.is_filler && !next.is_filler && next.end < previous.end => {
            Err(ScheduleError::invalid_state(format!(
                "producer {} ends at {}, before producer {} at {}",
                next.id, next.end, previous.id, previous.end
            )))
        }
        _ => Ok(()),
    }
}

fn new_filler(ctx: &ProducerContext<'_>, flavor: ElectionFlavor) -> Result<Producer, ScheduleError> {
    let new = NewProducer {
        sid: ctx.sid,
        kind: ProducerKind::Election {
            flavor,
            filter: CandidateFilter::default(),
        },
        name: None,
        start: ctx.now,
        end: ctx.now + FILLER_WINDOW_SECS,
        use_crossfade: Crossfade::On,
        use_tag_suffix: true,
        is_filler: true,
    };
    let id = ctx.schedule.insert_producer(&new)?;
    Ok(Producer::from_record(ProducerRecord {
        id,
        sid: new.sid,
        kind: new.kind,
        name: new.name,
        start: new.start,
        end: new.end,
        state: ProducerState::Scheduled,
        use_crossfade: new.use_crossfade,
        use_tag_suffix: new.use_tag_suffix,
        is_filler: new.is_filler,
        position: 0,
    }))
}

enum StepOutcome {
    Paused {
        entered: bool,
        title: Option<String>,
    },
    Played {
        body: String,
        song_id: i64,
        left_pause: bool,
        resolved_election: Option<i64>,
    },
}

fn run_step(
    conn: &Connection,
    settings: &StationSettings,
    schedule: &mut Schedule,
    now: i64,
) -> Result<StepOutcome, ScheduleError> {
    let sid = settings.sid;
    let state = StationStateStore::new(conn);
    if state.is_paused(sid)? {
        if state.get(sid, PAUSE_HEARTBEAT_START)?.is_none() {
            state.set(sid, PAUSE_HEARTBEAT_START, &now.to_string())?;
        }
        let entered = !state.flag(sid, PAUSED_PLAYING)?;
        if entered {
            state.set(sid, PAUSED_PLAYING, "1")?;
        }
        return Ok(StepOutcome::Paused {
            entered,
            title: state.pause_title(sid)?,
        });
    }
    let left_pause = state.clear(sid, PAUSED_PLAYING)?;
    state.clear(sid, PAUSE_HEARTBEAT_START)?;

    let catalog = SqliteCatalogStore::new(conn);
    let store = SqliteScheduleStore::new(conn);
    let ctx = ProducerContext {
        catalog: &catalog,
        schedule: &store,
        sid,
        now,
        songs_per_election: settings.songs_per_election,
        election_block: settings.election_block,
    };

    let switched = schedule.step(&ctx, settings.default_flavor)?;
    let (producer_id, song, body, resolved_election, winner_votes) = {
        let missing = || ScheduleError::invalid_state(format!("station {} has nothing playing", sid));
        let current = schedule.current.as_ref().ok_or_else(missing)?;
        let event = current.get_current_event().ok_or_else(missing)?;
        let song = event.playing_song().cloned().ok_or_else(missing)?;
        let body = event
            .playable(settings.annotations, settings.stream_suffix.as_deref())
            .ok_or_else(missing)?;
        let resolved = if switched { event.election() } else { None };
        (
            current.id,
            song,
            body,
            resolved.map(|e| e.id),
            resolved.and_then(|e| e.winner()).map(|w| w.votes),
        )
    };

    let report = start_cooldown(&catalog, &settings.cooldown, &song, sid, now)?;
    catalog.mark_played(song.id, sid, now)?;
    if let Some(votes) = winner_votes {
        catalog.add_to_vote_count(song.id, votes)?;
    }
    store.append_history(sid, producer_id, song.id, now)?;
    schedule.archive_stale_fillers(&ctx)?;
    schedule.ensure_filler(&ctx, settings.default_flavor)?;

    debug!(
        "Station {} playing song {} from producer {} ({} cooldown writes)",
        sid,
        song.id,
        producer_id,
        report.writes.len()
    );
    Ok(StepOutcome::Played {
        body,
        song_id: song.id,
        left_pause,
        resolved_election,
    })
}

/// Owns one station's storage connection and in-memory schedule.
pub struct StationScheduler {
    settings: StationSettings,
    storage: SqliteStorage,
    snapshot: Arc<SnapshotCache>,
    notifier: StationNotifier,
    schedule: Schedule,
}

impl StationScheduler {
    /// Restores the station's schedule from storage and repairs cached
    /// album state.
    pub fn load(
        settings: StationSettings,
        storage: SqliteStorage,
        snapshot: Arc<SnapshotCache>,
        notifier: StationNotifier,
    ) -> Result<Self, ScheduleError> {
        let sid = settings.sid;
        let (schedule, report) = {
            let conn = storage.connection();
            let catalog = SqliteCatalogStore::new(conn);
            let store = SqliteScheduleStore::new(conn);
            let schedule = Schedule::load(&catalog, &store, sid)?;
            let report: ReconcileReport = reconcile_albums(&catalog, sid)?;
            (schedule, report)
        };
        if !report.is_clean() {
            warn!(
                "Station {}: {} albums could not be reconciled",
                sid,
                report.failures.len()
            );
        }
        info!(
            "Station {} ({}) loaded: current producer {:?}, {} upcoming, {} songs in catalog",
            sid,
            settings.name,
            schedule.current.as_ref().map(|p| p.id),
            schedule.upcoming.len(),
            snapshot.current().num_songs(sid)
        );
        Ok(Self {
            settings,
            storage,
            snapshot,
            notifier,
            schedule,
        })
    }

    pub fn sid(&self) -> u32 {
        self.settings.sid
    }

    pub fn settings(&self) -> &StationSettings {
        &self.settings
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn current_producer(&self) -> Option<&Producer> {
        self.schedule.current.as_ref()
    }

    /// Advances the station by one song.
    ///
    /// Only storage conflicts that survived the retry and invalid producer
    /// states are returned as errors; everything else falls back to the
    /// pause placeholder.
    pub fn advance(&mut self, now: i64) -> Result<AdvanceOutcome, ScheduleError> {
        let sid = self.settings.sid;
        let started = Instant::now();
        let result = retry_on_conflict(
            self,
            |scheduler| scheduler.attempt(now),
            |scheduler| {
                warn!("Storage conflict on station {}, reconnecting", sid);
                metrics::record_storage_conflict(sid);
                scheduler.storage.reconnect().map_err(ScheduleError::from)
            },
        );

        let outcome = match result {
            Ok(step) => self.publish(step),
            Err(e) if e.is_retryable() => {
                warn!("Station {} still conflicting after retry: {}", sid, e);
                metrics::record_storage_conflict(sid);
                metrics::record_advance(sid, "conflict", started.elapsed());
                return Err(e);
            }
            Err(e) if e.is_fatal() => {
                error!("Station {} schedule is broken: {}", sid, e);
                metrics::record_advance(sid, "fatal", started.elapsed());
                return Err(e);
            }
            Err(ScheduleError::NoEligibleCandidates { .. }) => {
                warn!("Station {} has no eligible songs, playing the pause placeholder", sid);
                self.fallback()
            }
            Err(e) => {
                error!("Station {} advance failed: {}", sid, e);
                self.fallback()
            }
        };
        metrics::record_advance(sid, outcome.source.as_str(), started.elapsed());
        Ok(outcome)
    }

    fn attempt(&mut self, now: i64) -> Result<StepOutcome, ScheduleError> {
        let saved = self.schedule.clone();
        let settings = &self.settings;
        let schedule = &mut self.schedule;
        let result = self
            .storage
            .transaction(|tx| run_step(tx, settings, schedule, now));
        if result.is_err() {
            self.schedule = saved;
        }
        result
    }

    fn publish(&self, step: StepOutcome) -> AdvanceOutcome {
        let sid = self.settings.sid;
        match step {
            StepOutcome::Paused { entered, title } => {
                if entered {
                    info!("Station {} paused", sid);
                    metrics::set_station_paused(sid, true);
                    self.notifier.notify(sid, NotificationKind::PauseEntered);
                }
                AdvanceOutcome {
                    body: self.pause_body(title.as_deref()),
                    source: PlaySource::Pause,
                }
            }
            StepOutcome::Played {
                body,
                song_id,
                left_pause,
                resolved_election,
            } => {
                if left_pause {
                    info!("Station {} resumed", sid);
                    metrics::set_station_paused(sid, false);
                    self.notifier.notify(sid, NotificationKind::PauseLeft);
                }
                if let Some(election_id) = resolved_election {
                    debug!("Station {} resolved election {}", sid, election_id);
                    metrics::record_election_resolved(sid);
                }
                self.notifier
                    .notify(sid, NotificationKind::ScheduleAdvanced);
                AdvanceOutcome {
                    body,
                    source: PlaySource::Song(song_id),
                }
            }
        }
    }

    fn fallback(&self) -> AdvanceOutcome {
        let title = StationStateStore::new(self.storage.connection())
            .pause_title(self.settings.sid)
            .unwrap_or_else(|e| {
                debug!("Could not read pause title: {:#}", e);
                None
            });
        AdvanceOutcome {
            body: self.pause_body(title.as_deref()),
            source: PlaySource::Fallback,
        }
    }

    fn pause_body(&self, title: Option<&str>) -> String {
        let settings = &self.settings;
        if settings.annotations {
            pause_annotation(
                &settings.pause_file,
                title.unwrap_or(&settings.pause_title),
            )
            .to_string()
        } else {
            settings.pause_file.clone()
        }
    }

    pub fn song_standing(&self, song_id: i64) -> anyhow::Result<Option<SongStanding>> {
        let catalog = SqliteCatalogStore::new(self.storage.connection());
        match catalog.get_song(song_id, self.settings.sid)? {
            Some(song) => song_standing(&catalog, &self.snapshot.current(), &song),
            None => Ok(None),
        }
    }

    /// Recomputes the rating of a song and of its album from user ratings.
    pub fn update_ratings(&mut self, song_id: i64) -> anyhow::Result<Option<RatingUpdate>> {
        let sid = self.settings.sid;
        let threshold = self.settings.cooldown.rating_threshold;
        self.storage.transaction(|tx| {
            let catalog = SqliteCatalogStore::new(tx);
            if catalog.get_song(song_id, sid)?.is_none() {
                return Ok(None);
            }
            let song = update_song_rating(&catalog, song_id, threshold)?;
            let album = match catalog.get_membership(song_id)?.album {
                Some(album) => Some((album.id, update_album_rating(&catalog, album.id, threshold)?)),
                None => None,
            };
            Ok(Some(RatingUpdate { song, album }))
        })
    }
}
