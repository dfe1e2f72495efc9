//! Persistence for producers, elections and play history.

use super::models::{Crossfade, ElectionFlavor, ProducerKind, ProducerState};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct NewProducer {
    pub sid: u32,
    pub kind: ProducerKind,
    pub name: Option<String>,
    pub start: i64,
    pub end: i64,
    pub use_crossfade: Crossfade,
    pub use_tag_suffix: bool,
    pub is_filler: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRecord {
    pub id: i64,
    pub sid: u32,
    pub kind: ProducerKind,
    pub name: Option<String>,
    pub start: i64,
    pub end: i64,
    pub state: ProducerState,
    pub use_crossfade: Crossfade,
    pub use_tag_suffix: bool,
    pub is_filler: bool,
    /// Fixed lists: index into `song_ids` of the song playing.
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRecord {
    pub id: i64,
    pub song_id: i64,
    pub position: u32,
    pub votes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElectionRecord {
    pub id: i64,
    pub producer_id: i64,
    pub sid: u32,
    pub flavor: ElectionFlavor,
    pub seq: i64,
    pub opened_at: i64,
    pub resolved_at: Option<i64>,
    pub winner_entry_id: Option<i64>,
    pub entries: Vec<EntryRecord>,
}

pub trait ScheduleStore {
    fn insert_producer(&self, producer: &NewProducer) -> Result<i64>;

    /// Producers of `sid` that are not archived, earliest start first.
    fn active_producers(&self, sid: u32) -> Result<Vec<ProducerRecord>>;

    fn update_producer(&self, id: i64, state: ProducerState, position: usize, end: i64)
        -> Result<()>;

    /// Sequence number of the latest election created on `sid`.
    fn election_seq(&self, sid: u32) -> Result<i64>;

    /// Creates an election with the given pool under the next sequence
    /// number of `sid`.
    fn open_election(
        &self,
        producer_id: i64,
        sid: u32,
        flavor: ElectionFlavor,
        now: i64,
        song_ids: &[i64],
    ) -> Result<ElectionRecord>;

    fn election_for_producer(&self, producer_id: i64) -> Result<Option<ElectionRecord>>;

    fn vote_tallies(&self, election_id: i64) -> Result<HashMap<i64, u32>>;

    /// Adds one vote to an entry. Returns `false` when the election is no
    /// longer open or the entry does not belong to it.
    fn record_vote(&self, election_id: i64, entry_id: i64) -> Result<bool>;

    /// Closes an election; `winner_entry_id` is `None` when it was dropped
    /// without being played.
    fn close_election(&self, election_id: i64, winner_entry_id: Option<i64>, now: i64)
        -> Result<()>;

    fn append_history(&self, sid: u32, producer_id: i64, song_id: i64, now: i64) -> Result<()>;
}

pub struct SqliteScheduleStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteScheduleStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn row_to_producer(row: &Row) -> rusqlite::Result<(ProducerRecord, String, String, String)> {
        Ok((
            ProducerRecord {
                id: row.get("id")?,
                sid: row.get("sid")?,
                kind: ProducerKind::FixedList { song_ids: vec![] },
                name: row.get("name")?,
                start: row.get("start_time")?,
                end: row.get("end_time")?,
                state: ProducerState::Scheduled,
                use_crossfade: Crossfade::On,
                use_tag_suffix: row.get::<_, i64>("use_tag_suffix")? != 0,
                is_filler: row.get::<_, i64>("is_filler")? != 0,
                position: row.get::<_, i64>("position")? as usize,
            },
            row.get("params")?,
            row.get("state")?,
            row.get("use_crossfade")?,
        ))
    }

    fn load_entries(&self, election_id: i64) -> Result<Vec<EntryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, song_id, position, votes FROM election_entries
             WHERE election_id = ?1 ORDER BY position",
        )?;
        let entries = stmt
            .query_map(params![election_id], |row| {
                Ok(EntryRecord {
                    id: row.get(0)?,
                    song_id: row.get(1)?,
                    position: row.get(2)?,
                    votes: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

impl ScheduleStore for SqliteScheduleStore<'_> {
    fn insert_producer(&self, producer: &NewProducer) -> Result<i64> {
        let params_json = serde_json::to_string(&producer.kind)?;
        self.conn.execute(
            "INSERT INTO producers (sid, producer_type, name, start_time, end_time, state,
                                    use_crossfade, use_tag_suffix, is_filler, params, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
            params![
                producer.sid,
                producer.kind.type_name(),
                producer.name,
                producer.start,
                producer.end,
                ProducerState::Scheduled.as_str(),
                producer.use_crossfade.as_str(),
                producer.use_tag_suffix,
                producer.is_filler,
                params_json,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn active_producers(&self, sid: u32) -> Result<Vec<ProducerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM producers WHERE sid = ?1 AND state != 'archived'
             ORDER BY start_time, id",
        )?;
        let rows = stmt
            .query_map(params![sid], Self::row_to_producer)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut record, params_json, state, crossfade)| {
                record.kind = serde_json::from_str(&params_json)
                    .with_context(|| format!("Bad params for producer {}", record.id))?;
                record.state = ProducerState::parse(&state)
                    .with_context(|| format!("Bad state {:?} for producer {}", state, record.id))?;
                record.use_crossfade = Crossfade::parse(&crossfade).with_context(|| {
                    format!("Bad crossfade {:?} for producer {}", crossfade, record.id)
                })?;
                Ok(record)
            })
            .collect()
    }

    fn update_producer(
        &self,
        id: i64,
        state: ProducerState,
        position: usize,
        end: i64,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE producers SET state = ?2, position = ?3, end_time = ?4 WHERE id = ?1",
            params![id, state.as_str(), position as i64, end],
        )?;
        if changed == 0 {
            anyhow::bail!("Producer {} not found", id);
        }
        Ok(())
    }

    fn election_seq(&self, sid: u32) -> Result<i64> {
        let seq = self
            .conn
            .query_row(
                "SELECT election_seq FROM station_counters WHERE sid = ?1",
                params![sid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.unwrap_or(0))
    }

    fn open_election(
        &self,
        producer_id: i64,
        sid: u32,
        flavor: ElectionFlavor,
        now: i64,
        song_ids: &[i64],
    ) -> Result<ElectionRecord> {
        self.conn.execute(
            "INSERT INTO station_counters (sid, election_seq) VALUES (?1, 1)
             ON CONFLICT (sid) DO UPDATE SET election_seq = election_seq + 1",
            params![sid],
        )?;
        let seq = self.election_seq(sid)?;

        self.conn.execute(
            "INSERT INTO elections (producer_id, sid, flavor, seq, opened_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![producer_id, sid, flavor.as_str(), seq, now],
        )?;
        let election_id = self.conn.last_insert_rowid();

        let mut entries = Vec::with_capacity(song_ids.len());
        for (position, song_id) in song_ids.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO election_entries (election_id, song_id, position) VALUES (?1, ?2, ?3)",
                params![election_id, song_id, position as i64],
            )?;
            entries.push(EntryRecord {
                id: self.conn.last_insert_rowid(),
                song_id: *song_id,
                position: position as u32,
                votes: 0,
            });
        }

        Ok(ElectionRecord {
            id: election_id,
            producer_id,
            sid,
            flavor,
            seq,
            opened_at: now,
            resolved_at: None,
            winner_entry_id: None,
            entries,
        })
    }

    fn election_for_producer(&self, producer_id: i64) -> Result<Option<ElectionRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, producer_id, sid, flavor, seq, opened_at, resolved_at, winner_entry_id
                 FROM elections WHERE producer_id = ?1 ORDER BY id DESC LIMIT 1",
                params![producer_id],
                |row| {
                    Ok((
                        ElectionRecord {
                            id: row.get(0)?,
                            producer_id: row.get(1)?,
                            sid: row.get(2)?,
                            flavor: ElectionFlavor::General,
                            seq: row.get(4)?,
                            opened_at: row.get(5)?,
                            resolved_at: row.get(6)?,
                            winner_entry_id: row.get(7)?,
                            entries: Vec::new(),
                        },
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((mut record, flavor)) = record else {
            return Ok(None);
        };
        record.flavor = ElectionFlavor::parse(&flavor)
            .with_context(|| format!("Bad flavor {:?} for election {}", flavor, record.id))?;
        record.entries = self.load_entries(record.id)?;
        Ok(Some(record))
    }

    fn vote_tallies(&self, election_id: i64) -> Result<HashMap<i64, u32>> {
        Ok(self
            .load_entries(election_id)?
            .into_iter()
            .map(|entry| (entry.id, entry.votes))
            .collect())
    }

    fn record_vote(&self, election_id: i64, entry_id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE election_entries SET votes = votes + 1
             WHERE id = ?2 AND election_id = ?1
               AND EXISTS (SELECT 1 FROM elections WHERE id = ?1 AND resolved_at IS NULL)",
            params![election_id, entry_id],
        )?;
        Ok(changed > 0)
    }

    fn close_election(
        &self,
        election_id: i64,
        winner_entry_id: Option<i64>,
        now: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE elections SET resolved_at = ?2, winner_entry_id = ?3
             WHERE id = ?1 AND resolved_at IS NULL",
            params![election_id, now, winner_entry_id],
        )?;
        Ok(())
    }

    fn append_history(&self, sid: u32, producer_id: i64, song_id: i64, now: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO event_history (sid, producer_id, song_id, played_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![sid, producer_id, song_id, now],
        )?;
        Ok(())
    }
}
