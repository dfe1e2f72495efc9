//! Producers: scheduled slots that turn into playable events.
//!
//! A producer goes through `Scheduled -> Producing -> Current -> Archived`.
//! `produce` builds its event (loading a fixed list, or opening an election
//! for votes), `advance` makes it current and steps through its songs, and
//! `archive` retires it once the next producer takes over.

use super::election::{Election, ElectionEntry};
use super::error::ScheduleError;
use super::event::{Event, EventBody, FixedListEvent};
use super::models::{Crossfade, ProducerKind, ProducerState};
use super::store::{ProducerRecord, ScheduleStore};
use crate::catalog::election_block::start_election_block;
use crate::catalog::{CatalogStore, EligibilityQuery, Song};
use tracing::{debug, warn};

/// Stores and station settings a producer works against.
pub struct ProducerContext<'a> {
    pub catalog: &'a dyn CatalogStore,
    pub schedule: &'a dyn ScheduleStore,
    pub sid: u32,
    pub now: i64,
    pub songs_per_election: usize,
    /// How many following elections an election loser sits out.
    pub election_block: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceStep {
    /// A new song is playing; see [`Producer::get_current_event`].
    Playing,
    /// The event has nothing left to play.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Producer {
    pub id: i64,
    pub sid: u32,
    pub name: Option<String>,
    pub kind: ProducerKind,
    pub start: i64,
    pub end: i64,
    pub use_crossfade: Crossfade,
    pub use_tag_suffix: bool,
    pub is_filler: bool,
    state: ProducerState,
    event: Option<Event>,
}

impl Producer {
    pub fn from_record(record: ProducerRecord) -> Self {
        Self {
            id: record.id,
            sid: record.sid,
            name: record.name,
            kind: record.kind,
            start: record.start,
            end: record.end,
            use_crossfade: record.use_crossfade,
            use_tag_suffix: record.use_tag_suffix,
            is_filler: record.is_filler,
            state: record.state,
            event: None,
        }
    }

    /// Rebuilds a producer and its event from storage after a restart.
    pub fn restore(
        record: ProducerRecord,
        catalog: &dyn CatalogStore,
        schedule: &dyn ScheduleStore,
    ) -> Result<Self, ScheduleError> {
        let position = record.position;
        let mut producer = Self::from_record(record);
        let body = match (producer.state, &producer.kind) {
            (ProducerState::Scheduled, _) => return Ok(producer),
            (ProducerState::Archived, _) => {
                return Err(ScheduleError::invalid_state(format!(
                    "archived producer {} loaded as active",
                    producer.id
                )))
            }
            (state, ProducerKind::FixedList { song_ids }) => {
                let mut list =
                    FixedListEvent::with_slots(load_songs(catalog, song_ids, producer.sid)?);
                if state == ProducerState::Current {
                    if position >= song_ids.len() {
                        return Err(ScheduleError::invalid_state(format!(
                            "producer {} is at song {} of {}",
                            producer.id,
                            position,
                            song_ids.len()
                        )));
                    }
                    list.seek(position);
                }
                EventBody::FixedList(list)
            }
            (state, ProducerKind::Election { .. }) => {
                let record = schedule.election_for_producer(producer.id)?.ok_or_else(|| {
                    ScheduleError::invalid_state(format!(
                        "producer {} is {} without an election",
                        producer.id,
                        state.as_str()
                    ))
                })?;
                let mut entries = Vec::with_capacity(record.entries.len());
                for entry in &record.entries {
                    let song = catalog.get_song(entry.song_id, producer.sid)?.ok_or_else(|| {
                        ScheduleError::invalid_state(format!(
                            "election {} references missing song {}",
                            record.id, entry.song_id
                        ))
                    })?;
                    entries.push(ElectionEntry {
                        id: entry.id,
                        song,
                        position: entry.position,
                        votes: entry.votes,
                    });
                }
                let mut election = Election::new(
                    record.id,
                    record.sid,
                    record.seq,
                    record.flavor,
                    entries,
                    record.opened_at,
                );
                match (state, record.winner_entry_id, record.resolved_at) {
                    (ProducerState::Current, Some(winner), Some(resolved_at)) => {
                        election = election.resolved(winner, resolved_at);
                    }
                    (ProducerState::Producing, None, None) => {}
                    _ => {
                        return Err(ScheduleError::invalid_state(format!(
                            "producer {} is {} but election {} resolution does not match",
                            producer.id,
                            state.as_str(),
                            record.id
                        )))
                    }
                }
                EventBody::Election(election)
            }
        };
        producer.event = Some(producer.make_event(body));
        Ok(producer)
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    pub fn get_current_event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.start <= now
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.end <= now
    }

    /// Whether the producer holds an open election with an entry that has
    /// started cooling down or been blocked since the pool was drawn.
    pub fn has_stale_pool(&self, ctx: &ProducerContext<'_>) -> Result<bool, ScheduleError> {
        if self.state != ProducerState::Producing {
            return Ok(false);
        }
        match self.event.as_ref().and_then(|e| e.election()) {
            Some(election) if election.is_open() => pool_is_stale(ctx, election),
            _ => Ok(false),
        }
    }

    fn make_event(&self, body: EventBody) -> Event {
        Event {
            producer_id: self.id,
            name: self.name.clone(),
            use_crossfade: self.use_crossfade,
            use_tag_suffix: self.use_tag_suffix,
            body,
        }
    }

    fn position(&self) -> usize {
        match self.event.as_ref().map(|e| &e.body) {
            Some(EventBody::FixedList(list)) => list.slot().unwrap_or(0),
            _ => 0,
        }
    }

    fn persist(&self, schedule: &dyn ScheduleStore) -> Result<(), ScheduleError> {
        schedule.update_producer(self.id, self.state, self.position(), self.end)?;
        Ok(())
    }

    /// Builds the producer's event. Only valid on a scheduled producer.
    pub fn produce(&mut self, ctx: &ProducerContext<'_>) -> Result<&Event, ScheduleError> {
        if self.state != ProducerState::Scheduled {
            return Err(ScheduleError::invalid_state(format!(
                "producer {} asked to produce while {}",
                self.id,
                self.state.as_str()
            )));
        }
        if self.start > self.end {
            return Err(ScheduleError::invalid_state(format!(
                "producer {} window is inverted ({} > {})",
                self.id, self.start, self.end
            )));
        }

        let body = match &self.kind {
            ProducerKind::FixedList { song_ids } => {
                let songs = load_songs(ctx.catalog, song_ids, ctx.sid)?;
                if songs.is_empty() {
                    return Err(ScheduleError::NoEligibleCandidates { sid: ctx.sid });
                }
                EventBody::FixedList(FixedListEvent::with_slots(songs))
            }
            ProducerKind::Election { flavor, filter } => {
                let next_seq = ctx.schedule.election_seq(ctx.sid)? + 1;
                let pool = ctx.catalog.find_eligible(&EligibilityQuery {
                    sid: ctx.sid,
                    now: ctx.now,
                    election_seq: next_seq,
                    order: flavor.order(),
                    filter,
                    limit: ctx.songs_per_election,
                })?;
                if pool.is_empty() {
                    return Err(ScheduleError::NoEligibleCandidates { sid: ctx.sid });
                }
                let song_ids: Vec<i64> = pool.iter().map(|s| s.id).collect();
                let record =
                    ctx.schedule
                        .open_election(self.id, ctx.sid, *flavor, ctx.now, &song_ids)?;
                let entries = record
                    .entries
                    .iter()
                    .zip(pool)
                    .map(|(entry, song)| ElectionEntry {
                        id: entry.id,
                        song,
                        position: entry.position,
                        votes: 0,
                    })
                    .collect();
                debug!(
                    "Opened election {} (seq {}) for producer {} with songs {:?}",
                    record.id, record.seq, self.id, song_ids
                );
                EventBody::Election(Election::new(
                    record.id,
                    ctx.sid,
                    record.seq,
                    *flavor,
                    entries,
                    ctx.now,
                ))
            }
        };

        let event = self.make_event(body);
        self.state = ProducerState::Producing;
        self.event = Some(event);
        self.persist(ctx.schedule)?;
        self.get_current_event()
            .ok_or_else(|| ScheduleError::invalid_state("event vanished after produce"))
    }

    /// Moves the producer forward by one song. The first call resolves the
    /// event and makes the producer current.
    pub fn advance(&mut self, ctx: &ProducerContext<'_>) -> Result<AdvanceStep, ScheduleError> {
        let (id, sid, state) = (self.id, self.sid, self.state);
        let event = self.event.as_mut().ok_or_else(|| {
            ScheduleError::invalid_state(format!(
                "producer {} advanced while {} without an event",
                id,
                state.as_str()
            ))
        })?;

        let step = match (state, &mut event.body) {
            (
                ProducerState::Producing | ProducerState::Current,
                EventBody::FixedList(list),
            ) => {
                if list.step() {
                    AdvanceStep::Playing
                } else {
                    AdvanceStep::Exhausted
                }
            }
            (ProducerState::Producing, EventBody::Election(election)) => {
                let tallies = ctx.schedule.vote_tallies(election.id)?;
                election.apply_tallies(&tallies);
                let winner = election.resolve(ctx.now)?.id;
                ctx.schedule
                    .close_election(election.id, Some(winner), ctx.now)?;

                let current_seq = ctx.schedule.election_seq(sid)?;
                for loser in election.losers() {
                    let membership = ctx.catalog.get_membership(loser.song.id)?;
                    start_election_block(
                        ctx.catalog,
                        &loser.song,
                        &membership,
                        sid,
                        ctx.election_block,
                        current_seq,
                        "election",
                    )?;
                }
                debug!(
                    "Election {} resolved, entry {} won with {:?}",
                    election.id,
                    winner,
                    election.winner().map(|w| w.votes)
                );
                AdvanceStep::Playing
            }
            (ProducerState::Current, EventBody::Election(_)) => AdvanceStep::Exhausted,
            (state, _) => {
                return Err(ScheduleError::invalid_state(format!(
                    "producer {} cannot advance while {}",
                    id,
                    state.as_str()
                )))
            }
        };

        if step == AdvanceStep::Playing {
            self.state = ProducerState::Current;
            self.persist(ctx.schedule)?;
        }
        Ok(step)
    }

    /// Retires the producer. An election that never got played is closed
    /// without a winner so its songs return to the pool.
    pub fn archive(&mut self, schedule: &dyn ScheduleStore, now: i64) -> Result<(), ScheduleError> {
        if self.state == ProducerState::Archived {
            return Err(ScheduleError::invalid_state(format!(
                "producer {} archived twice",
                self.id
            )));
        }
        if let Some(election) = self.event.as_ref().and_then(|e| e.election()) {
            if election.is_open() {
                schedule.close_election(election.id, None, now)?;
            }
        }
        self.end = self.end.min(now);
        self.state = ProducerState::Archived;
        self.persist(schedule)
    }
}

fn pool_is_stale(ctx: &ProducerContext<'_>, election: &Election) -> Result<bool, ScheduleError> {
    for entry in &election.entries {
        if !ctx
            .catalog
            .is_rotation_clear(entry.song.id, ctx.sid, ctx.now, election.seq)?
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Loads the songs of a fixed list with their index in `song_ids`.
fn load_songs(
    catalog: &dyn CatalogStore,
    song_ids: &[i64],
    sid: u32,
) -> Result<Vec<(usize, Song)>, ScheduleError> {
    let mut songs = Vec::with_capacity(song_ids.len());
    for (slot, song_id) in song_ids.iter().enumerate() {
        match catalog.get_song(*song_id, sid)? {
            Some(song) if song.exists_on_station => songs.push((slot, song)),
            _ => warn!("Song {} is not available on station {}, skipping", song_id, sid),
        }
    }
    Ok(songs)
}
