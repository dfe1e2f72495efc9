//! Catalog query interface and its SQLite implementation.
//!
//! The scheduler never mutates catalog content; it only reads songs and
//! writes the rotation columns it owns (cooldowns, election blocks, ratings,
//! last-played times).

use super::models::{
    Album, CandidateOrder, EligibilityQuery, EntityRef, Membership, RatingSummary, RatingTally,
    Song, SongGroup,
};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;

/// Per-station song counts, used by the catalog snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationSongCount {
    pub sid: u32,
    pub songs: usize,
    pub origin_songs: usize,
}

pub trait CatalogStore {
    fn get_song(&self, song_id: i64, sid: u32) -> Result<Option<Song>>;

    /// Returns the candidate pool for an election, already ordered and
    /// limited to one song per album.
    fn find_eligible(&self, query: &EligibilityQuery<'_>) -> Result<Vec<Song>>;

    /// Whether the song could enter a pool for election `election_seq` at
    /// `now`. Open elections holding the song are not considered.
    fn is_rotation_clear(&self, song_id: i64, sid: u32, now: i64, election_seq: i64)
        -> Result<bool>;

    fn get_rating(&self, entity: EntityRef) -> Result<RatingSummary>;

    fn set_rating(&self, entity: EntityRef, summary: RatingSummary) -> Result<()>;

    fn get_membership(&self, song_id: i64) -> Result<Membership>;

    /// Per-score counts of the user ratings given to `entity`'s songs.
    fn rating_tallies(&self, entity: EntityRef) -> Result<Vec<RatingTally>>;

    fn cool_end(&self, entity: EntityRef, sid: u32) -> Result<i64>;

    /// Moves the cooldown end of `entity` forward to `cool_end`. Returns
    /// `false` when the stored value is already later.
    fn extend_cool_end(&self, entity: EntityRef, sid: u32, cool_end: i64) -> Result<bool>;

    fn set_request_only_end(&self, song_id: i64, sid: u32, request_only_end: i64) -> Result<()>;

    fn elec_block_until(&self, entity: EntityRef, sid: u32) -> Result<i64>;

    /// Moves the election block threshold of `entity` forward. Returns
    /// `false` when the stored threshold is already later.
    fn extend_elec_block(
        &self,
        entity: EntityRef,
        sid: u32,
        until_seq: i64,
        blocked_by: &str,
    ) -> Result<bool>;

    fn album_cool_lowest(&self, album_id: i64, sid: u32) -> Result<i64>;

    /// Recomputes an album's cached `cool_lowest` from its member songs.
    fn refresh_album_cool_lowest(&self, album_id: i64, sid: u32) -> Result<i64>;

    /// Stamps the song, and its album if it has one, as played at `now`.
    fn mark_played(&self, song_id: i64, sid: u32, now: i64) -> Result<()>;

    /// Adds the votes a song won an election with to its lifetime count.
    fn add_to_vote_count(&self, song_id: i64, votes: u32) -> Result<()>;

    fn album_ids(&self, sid: u32) -> Result<Vec<i64>>;

    fn song_counts(&self) -> Result<Vec<StationSongCount>>;

    fn count_rated_songs(&self) -> Result<usize>;

    fn count_rated_above(&self, rating: f64) -> Result<usize>;
}

/// Keeps the first song of each album (songs without an album always
/// pass) until `limit` songs are collected.
pub fn take_distinct_albums<I>(songs: I, limit: usize) -> Vec<Song>
where
    I: IntoIterator<Item = Song>,
{
    let mut seen = HashSet::new();
    let mut pool = Vec::with_capacity(limit);
    for song in songs {
        if pool.len() >= limit {
            break;
        }
        if let Some(album_id) = song.album_id {
            if !seen.insert(album_id) {
                continue;
            }
        }
        pool.push(song);
    }
    pool
}

const SONG_COLUMNS: &str = "s.id, ss.sid, s.origin_sid, s.filename, s.title, s.length, s.added_on, \
     s.rating, s.rating_count, s.cool_override, s.cool_multiply, s.replay_gain, s.album_id, \
     ss.exists_on_station, ss.cool_end, ss.request_only_end, ss.elec_block_until, \
     ss.elec_blocked_by, ss.played_last";

/// Song row `s` with station row `ss` and album station row `a`, for
/// station `?1` at time `?2` and election sequence `?3`: on the station, not
/// cooling down, not request-only and not election-blocked, through its album
/// and groups too.
const ROTATION_CLEAR: &str = "ss.exists_on_station = 1
               AND ss.cool_end <= ?2
               AND ss.request_only_end <= ?2
               AND ss.elec_block_until < ?3
               AND (a.album_id IS NULL OR (a.cool_end <= ?2 AND a.elec_block_until < ?3))
               AND NOT EXISTS (
                   SELECT 1 FROM group_members gm
                   JOIN group_stations gs ON gs.group_id = gm.group_id AND gs.sid = ?1
                   WHERE gm.song_id = s.id AND (gs.cool_end > ?2 OR gs.elec_block_until >= ?3))";

fn row_to_song(row: &Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        sid: row.get(1)?,
        origin_sid: row.get(2)?,
        filename: row.get(3)?,
        title: row.get(4)?,
        length: row.get(5)?,
        added_on: row.get(6)?,
        rating: row.get(7)?,
        rating_count: row.get(8)?,
        cool_override: row.get(9)?,
        cool_multiply: row.get(10)?,
        replay_gain: row.get(11)?,
        album_id: row.get(12)?,
        exists_on_station: row.get::<_, i64>(13)? != 0,
        cool_end: row.get(14)?,
        request_only_end: row.get(15)?,
        elec_block_until: row.get(16)?,
        elec_blocked_by: row.get(17)?,
        played_last: row.get(18)?,
    })
}

/// (per-station table, id column) holding rotation state for `entity`.
fn station_table(entity: EntityRef) -> (&'static str, &'static str) {
    match entity {
        EntityRef::Song(_) => ("song_stations", "song_id"),
        EntityRef::Group(_) => ("group_stations", "group_id"),
        EntityRef::Album(_) => ("album_stations", "album_id"),
    }
}

/// Catalog store over a borrowed connection, so it can run inside the
/// advance transaction.
pub struct SqliteCatalogStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteCatalogStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl CatalogStore for SqliteCatalogStore<'_> {
    fn get_song(&self, song_id: i64, sid: u32) -> Result<Option<Song>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM songs s JOIN song_stations ss ON ss.song_id = s.id \
                     WHERE s.id = ?1 AND ss.sid = ?2",
                    SONG_COLUMNS
                ),
                params![song_id, sid],
                row_to_song,
            )
            .optional()
            .with_context(|| format!("Failed to load song {} for station {}", song_id, sid))
    }

    fn find_eligible(&self, query: &EligibilityQuery<'_>) -> Result<Vec<Song>> {
        let order = match query.order {
            CandidateOrder::Shortest => "s.length ASC, s.id ASC",
            CandidateOrder::LeastRecentlyPlayed => "ss.played_last ASC, s.id ASC",
        };
        let sql = format!(
            "SELECT {columns} FROM songs s
             JOIN song_stations ss ON ss.song_id = s.id AND ss.sid = ?1
             LEFT JOIN album_stations a ON a.album_id = s.album_id AND a.sid = ?1
             WHERE {rotation_clear}
               AND NOT EXISTS (
                   SELECT 1 FROM election_entries ee
                   JOIN elections e ON e.id = ee.election_id
                   WHERE ee.song_id = s.id AND e.sid = ?1 AND e.resolved_at IS NULL)
               AND (?4 IS NULL OR s.length <= ?4)
               AND (?5 IS NULL OR (s.rating IS NOT NULL AND s.rating >= ?5))
               AND (?6 IS NULL OR EXISTS (
                   SELECT 1 FROM group_members tag WHERE tag.song_id = s.id AND tag.group_id = ?6))
             ORDER BY {order}",
            columns = SONG_COLUMNS,
            rotation_clear = ROTATION_CLEAR,
            order = order,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                query.sid,
                query.now,
                query.election_seq,
                query.filter.max_length,
                query.filter.min_rating,
                query.filter.group_id,
            ],
            row_to_song,
        )?;

        let mut songs = Vec::new();
        for row in rows {
            songs.push(row.context("Failed to read eligible song")?);
        }
        Ok(take_distinct_albums(songs, query.limit))
    }

    fn is_rotation_clear(
        &self,
        song_id: i64,
        sid: u32,
        now: i64,
        election_seq: i64,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (
                 SELECT 1 FROM songs s
                 JOIN song_stations ss ON ss.song_id = s.id AND ss.sid = ?1
                 LEFT JOIN album_stations a ON a.album_id = s.album_id AND a.sid = ?1
                 WHERE s.id = ?4 AND {})",
            ROTATION_CLEAR
        );
        self.conn
            .query_row(&sql, params![sid, now, election_seq, song_id], |row| row.get(0))
            .with_context(|| format!("Failed to check rotation of song {}", song_id))
    }

    fn get_rating(&self, entity: EntityRef) -> Result<RatingSummary> {
        let table = match entity {
            EntityRef::Song(_) => "songs",
            EntityRef::Album(_) => "albums",
            EntityRef::Group(_) => {
                return Ok(RatingSummary {
                    rating: None,
                    count: 0,
                })
            }
        };
        let summary = self
            .conn
            .query_row(
                &format!("SELECT rating, rating_count FROM {} WHERE id = ?1", table),
                params![entity.id()],
                |row| {
                    Ok(RatingSummary {
                        rating: row.get(0)?,
                        count: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(summary.unwrap_or(RatingSummary {
            rating: None,
            count: 0,
        }))
    }

    fn set_rating(&self, entity: EntityRef, summary: RatingSummary) -> Result<()> {
        let table = match entity {
            EntityRef::Song(_) => "songs",
            EntityRef::Album(_) => "albums",
            EntityRef::Group(_) => anyhow::bail!("Groups carry no rating"),
        };
        self.conn.execute(
            &format!("UPDATE {} SET rating = ?1, rating_count = ?2 WHERE id = ?3", table),
            params![summary.rating, summary.count, entity.id()],
        )?;
        Ok(())
    }

    fn get_membership(&self, song_id: i64) -> Result<Membership> {
        let mut stmt = self.conn.prepare(
            "SELECT g.id, g.name, g.cooldown, g.elec_block FROM song_groups g
             JOIN group_members gm ON gm.group_id = g.id
             WHERE gm.song_id = ?1 ORDER BY g.id",
        )?;
        let groups = stmt
            .query_map(params![song_id], |row| {
                Ok(SongGroup {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    cooldown: row.get(2)?,
                    elec_block: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let album = self
            .conn
            .query_row(
                "SELECT a.id, a.name, a.rating, a.rating_count FROM albums a
                 JOIN songs s ON s.album_id = a.id WHERE s.id = ?1",
                params![song_id],
                |row| {
                    Ok(Album {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        rating: row.get(2)?,
                        rating_count: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(Membership { groups, album })
    }

    fn rating_tallies(&self, entity: EntityRef) -> Result<Vec<RatingTally>> {
        let sql = match entity {
            EntityRef::Song(_) => {
                "SELECT rating, COUNT(*) FROM song_ratings WHERE song_id = ?1 GROUP BY rating"
            }
            EntityRef::Album(_) => {
                "SELECT r.rating, COUNT(*) FROM song_ratings r
                 JOIN songs s ON s.id = r.song_id
                 WHERE s.album_id = ?1 GROUP BY r.rating"
            }
            EntityRef::Group(_) => return Ok(Vec::new()),
        };
        let mut stmt = self.conn.prepare(sql)?;
        let tallies = stmt
            .query_map(params![entity.id()], |row| {
                Ok(RatingTally {
                    score: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tallies)
    }

    fn cool_end(&self, entity: EntityRef, sid: u32) -> Result<i64> {
        let (table, id_column) = station_table(entity);
        let value = self
            .conn
            .query_row(
                &format!("SELECT cool_end FROM {} WHERE {} = ?1 AND sid = ?2", table, id_column),
                params![entity.id(), sid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    fn extend_cool_end(&self, entity: EntityRef, sid: u32, cool_end: i64) -> Result<bool> {
        let changed = match entity {
            EntityRef::Song(id) => self.conn.execute(
                "UPDATE song_stations SET cool_end = ?3
                 WHERE song_id = ?1 AND sid = ?2 AND cool_end < ?3",
                params![id, sid, cool_end],
            )?,
            EntityRef::Group(_) | EntityRef::Album(_) => {
                let (table, id_column) = station_table(entity);
                self.conn.execute(
                    &format!(
                        "INSERT INTO {table} ({id}, sid, cool_end) VALUES (?1, ?2, ?3)
                         ON CONFLICT ({id}, sid) DO UPDATE SET cool_end = excluded.cool_end
                         WHERE {table}.cool_end < excluded.cool_end",
                        table = table,
                        id = id_column
                    ),
                    params![entity.id(), sid, cool_end],
                )?
            }
        };
        Ok(changed > 0)
    }

    fn set_request_only_end(&self, song_id: i64, sid: u32, request_only_end: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE song_stations SET request_only_end = ?3 WHERE song_id = ?1 AND sid = ?2",
            params![song_id, sid, request_only_end],
        )?;
        Ok(())
    }

    fn elec_block_until(&self, entity: EntityRef, sid: u32) -> Result<i64> {
        let (table, id_column) = station_table(entity);
        let value = self
            .conn
            .query_row(
                &format!(
                    "SELECT elec_block_until FROM {} WHERE {} = ?1 AND sid = ?2",
                    table, id_column
                ),
                params![entity.id(), sid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    fn extend_elec_block(
        &self,
        entity: EntityRef,
        sid: u32,
        until_seq: i64,
        blocked_by: &str,
    ) -> Result<bool> {
        let changed = match entity {
            EntityRef::Song(id) => self.conn.execute(
                "UPDATE song_stations SET elec_block_until = ?3, elec_blocked_by = ?4
                 WHERE song_id = ?1 AND sid = ?2 AND elec_block_until <= ?3",
                params![id, sid, until_seq, blocked_by],
            )?,
            EntityRef::Group(_) | EntityRef::Album(_) => {
                let (table, id_column) = station_table(entity);
                self.conn.execute(
                    &format!(
                        "INSERT INTO {table} ({id}, sid, elec_block_until) VALUES (?1, ?2, ?3)
                         ON CONFLICT ({id}, sid) DO UPDATE SET elec_block_until = excluded.elec_block_until
                         WHERE {table}.elec_block_until <= excluded.elec_block_until",
                        table = table,
                        id = id_column
                    ),
                    params![entity.id(), sid, until_seq],
                )?
            }
        };
        Ok(changed > 0)
    }

    fn album_cool_lowest(&self, album_id: i64, sid: u32) -> Result<i64> {
        let value = self
            .conn
            .query_row(
                "SELECT cool_lowest FROM album_stations WHERE album_id = ?1 AND sid = ?2",
                params![album_id, sid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    fn refresh_album_cool_lowest(&self, album_id: i64, sid: u32) -> Result<i64> {
        let lowest: Option<i64> = self.conn.query_row(
            "SELECT MIN(ss.cool_end) FROM song_stations ss
             JOIN songs s ON s.id = ss.song_id
             WHERE s.album_id = ?1 AND ss.sid = ?2 AND ss.exists_on_station = 1",
            params![album_id, sid],
            |row| row.get(0),
        )?;
        let lowest = lowest.unwrap_or(0);
        self.conn.execute(
            "INSERT INTO album_stations (album_id, sid, cool_lowest) VALUES (?1, ?2, ?3)
             ON CONFLICT (album_id, sid) DO UPDATE SET cool_lowest = excluded.cool_lowest",
            params![album_id, sid, lowest],
        )?;
        Ok(lowest)
    }

    fn mark_played(&self, song_id: i64, sid: u32, now: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE song_stations SET played_last = ?3 WHERE song_id = ?1 AND sid = ?2",
            params![song_id, sid, now],
        )?;
        self.conn.execute(
            "INSERT INTO album_stations (album_id, sid, played_last)
             SELECT album_id, ?2, ?3 FROM songs WHERE id = ?1 AND album_id IS NOT NULL
             ON CONFLICT (album_id, sid) DO UPDATE SET played_last = excluded.played_last",
            params![song_id, sid, now],
        )?;
        Ok(())
    }

    fn add_to_vote_count(&self, song_id: i64, votes: u32) -> Result<()> {
        self.conn.execute(
            "UPDATE songs SET vote_count = vote_count + ?2 WHERE id = ?1",
            params![song_id, votes],
        )?;
        Ok(())
    }

    fn album_ids(&self, sid: u32) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT s.album_id FROM songs s
             JOIN song_stations ss ON ss.song_id = s.id
             WHERE ss.sid = ?1 AND s.album_id IS NOT NULL ORDER BY s.album_id",
        )?;
        let ids = stmt
            .query_map(params![sid], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    fn song_counts(&self) -> Result<Vec<StationSongCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT ss.sid, COUNT(*), SUM(CASE WHEN s.origin_sid = ss.sid THEN 1 ELSE 0 END)
             FROM song_stations ss JOIN songs s ON s.id = ss.song_id
             WHERE ss.exists_on_station = 1
             GROUP BY ss.sid ORDER BY ss.sid",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(StationSongCount {
                    sid: row.get(0)?,
                    songs: row.get::<_, i64>(1)? as usize,
                    origin_songs: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    fn count_rated_songs(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM songs WHERE rating IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_rated_above(&self, rating: f64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM songs WHERE rating > ?1",
            params![rating],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::CandidateFilter;
    use crate::storage::test_db::{insert_album, insert_group, insert_song};
    use crate::storage::SqliteStorage;
    use std::time::Duration;
    use tempfile::TempDir;

    fn storage() -> (TempDir, SqliteStorage) {
        let dir = TempDir::new().unwrap();
        let storage =
            SqliteStorage::open(dir.path().join("radio.db"), Duration::from_millis(50)).unwrap();
        (dir, storage)
    }

    fn query(filter: &CandidateFilter, order: CandidateOrder) -> EligibilityQuery<'_> {
        EligibilityQuery {
            sid: 1,
            now: 1_000,
            election_seq: 10,
            order,
            filter,
            limit: 3,
        }
    }

    #[test]
    fn shortest_pool_orders_by_length_then_id() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 3, 1, 100, None);
        insert_song(conn, 2, 1, 100, None);
        insert_song(conn, 1, 1, 300, None);
        insert_song(conn, 4, 1, 50, None);

        let store = SqliteCatalogStore::new(conn);
        let filter = CandidateFilter::default();
        let pool = store
            .find_eligible(&query(&filter, CandidateOrder::Shortest))
            .unwrap();
        let ids: Vec<i64> = pool.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![4, 2, 3]);
    }

    #[test]
    fn pool_excludes_cool_blocked_and_other_stations() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 1, 1, 100, None);
        insert_song(conn, 2, 1, 100, None);
        insert_song(conn, 3, 1, 100, None);
        insert_song(conn, 4, 2, 100, None);
        let store = SqliteCatalogStore::new(conn);
        assert!(store.extend_cool_end(EntityRef::Song(1), 1, 2_000).unwrap());
        assert!(store
            .extend_elec_block(EntityRef::Song(2), 1, 10, "election")
            .unwrap());

        let filter = CandidateFilter::default();
        let pool = store
            .find_eligible(&query(&filter, CandidateOrder::Shortest))
            .unwrap();
        let ids: Vec<i64> = pool.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn pool_keeps_one_song_per_album() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_album(conn, 7, 1);
        insert_song(conn, 1, 1, 100, Some(7));
        insert_song(conn, 2, 1, 110, Some(7));
        insert_song(conn, 3, 1, 120, None);
        let store = SqliteCatalogStore::new(conn);

        let filter = CandidateFilter::default();
        let pool = store
            .find_eligible(&query(&filter, CandidateOrder::Shortest))
            .unwrap();
        let ids: Vec<i64> = pool.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn cooling_group_hides_its_members() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 1, 1, 100, None);
        insert_song(conn, 2, 1, 100, None);
        insert_group(conn, 5, 1, 600, None, &[1]);
        let store = SqliteCatalogStore::new(conn);
        store.extend_cool_end(EntityRef::Group(5), 1, 1_500).unwrap();

        let filter = CandidateFilter::default();
        let pool = store
            .find_eligible(&query(&filter, CandidateOrder::Shortest))
            .unwrap();
        assert_eq!(pool.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn filter_limits_length_and_group() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 1, 1, 100, None);
        insert_song(conn, 2, 1, 400, None);
        insert_song(conn, 3, 1, 120, None);
        insert_group(conn, 5, 1, 0, None, &[2, 3]);
        let store = SqliteCatalogStore::new(conn);

        let filter = CandidateFilter {
            max_length: Some(300),
            min_rating: None,
            group_id: Some(5),
        };
        let pool = store
            .find_eligible(&query(&filter, CandidateOrder::Shortest))
            .unwrap();
        assert_eq!(pool.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn cool_end_only_moves_forward() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 1, 1, 100, None);
        insert_album(conn, 9, 1);
        let store = SqliteCatalogStore::new(conn);

        assert!(store.extend_cool_end(EntityRef::Song(1), 1, 500).unwrap());
        assert!(!store.extend_cool_end(EntityRef::Song(1), 1, 400).unwrap());
        assert_eq!(store.cool_end(EntityRef::Song(1), 1).unwrap(), 500);

        assert!(store.extend_cool_end(EntityRef::Album(9), 1, 800).unwrap());
        assert!(!store.extend_cool_end(EntityRef::Album(9), 1, 700).unwrap());
        assert_eq!(store.cool_end(EntityRef::Album(9), 1).unwrap(), 800);
    }

    #[test]
    fn membership_lists_groups_and_album() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_album(conn, 9, 1);
        insert_song(conn, 1, 1, 100, Some(9));
        insert_group(conn, 4, 1, 60, Some(5), &[1]);
        let store = SqliteCatalogStore::new(conn);

        let membership = store.get_membership(1).unwrap();
        assert_eq!(membership.groups.len(), 1);
        assert_eq!(membership.groups[0].elec_block, Some(5));
        assert_eq!(membership.album.map(|a| a.id), Some(9));
    }

    #[test]
    fn song_counts_split_origin_songs() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 1, 1, 100, None);
        insert_song(conn, 2, 2, 100, None);
        conn.execute("INSERT INTO song_stations (song_id, sid) VALUES (2, 1)", [])
            .unwrap();
        let store = SqliteCatalogStore::new(conn);

        let counts = store.song_counts().unwrap();
        assert_eq!(
            counts[0],
            StationSongCount {
                sid: 1,
                songs: 2,
                origin_songs: 1
            }
        );
    }

    #[test]
    fn playing_a_song_stamps_its_album() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_album(conn, 9, 1);
        insert_song(conn, 1, 1, 100, Some(9));
        insert_song(conn, 2, 1, 100, None);
        let store = SqliteCatalogStore::new(conn);

        store.mark_played(1, 1, 700).unwrap();
        store.mark_played(2, 1, 800).unwrap();

        let album_played: i64 = conn
            .query_row(
                "SELECT played_last FROM album_stations WHERE album_id = 9 AND sid = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(album_played, 700);
        let albums: i64 = conn
            .query_row("SELECT COUNT(*) FROM album_stations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(albums, 1);
    }

    #[test]
    fn vote_count_accumulates() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 1, 1, 100, None);
        let store = SqliteCatalogStore::new(conn);

        store.add_to_vote_count(1, 3).unwrap();
        store.add_to_vote_count(1, 2).unwrap();

        let votes: i64 = conn
            .query_row("SELECT vote_count FROM songs WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(votes, 5);
    }
}
