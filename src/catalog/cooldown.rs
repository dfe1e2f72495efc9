//! Cooldown model.
//!
//! A song that starts playing goes "cool" for a while: it cannot be picked
//! for elections until its cooldown ends. The length depends on the song's
//! rating (worse rating, longer cooldown), its age and per-song overrides.
//! The cooldown cascades to the song's groups and album. Stored cooldown
//! ends never move backwards.

use super::models::{EntityRef, Song};
use super::store::CatalogStore;
use anyhow::Result;
use tracing::debug;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// How the cooldown shrinks as a song ages.
///
/// The multiplier is 1.0 up to `grace_days`, falls linearly to
/// `floor_multiplier` at `floor_days`, then stays there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeCurve {
    pub grace_days: f64,
    pub floor_days: f64,
    pub floor_multiplier: f64,
}

impl Default for AgeCurve {
    fn default() -> Self {
        Self {
            grace_days: 30.0,
            floor_days: 365.0,
            floor_multiplier: 0.8,
        }
    }
}

impl AgeCurve {
    pub fn multiplier(&self, added_on: i64, now: i64) -> f64 {
        let age_days = (now - added_on).max(0) as f64 / SECONDS_PER_DAY;
        if age_days <= self.grace_days {
            return 1.0;
        }
        if age_days >= self.floor_days || self.floor_days <= self.grace_days {
            return self.floor_multiplier;
        }
        let progress = (age_days - self.grace_days) / (self.floor_days - self.grace_days);
        1.0 - progress * (1.0 - self.floor_multiplier)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CooldownConfig {
    pub min_song_cool: i64,
    pub max_song_cool: i64,
    pub min_album_cool: i64,
    pub max_album_cool: i64,
    /// Rating used for unrated songs and albums.
    pub base_rating: f64,
    /// Ratings backed by this many votes or fewer count as unrated.
    pub rating_threshold: u32,
    /// Extra time after the cooldown during which a song is only requestable.
    pub request_only_period: i64,
    pub age: AgeCurve,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            min_song_cool: 600,
            max_song_cool: 3_600,
            min_album_cool: 1_800,
            max_album_cool: 7_200,
            base_rating: 3.0,
            rating_threshold: 10,
            request_only_period: 0,
            age: AgeCurve::default(),
        }
    }
}

impl CooldownConfig {
    fn effective_rating(&self, rating: Option<f64>, count: u32) -> f64 {
        match rating {
            Some(r) if r > 0.0 && count > self.rating_threshold => r.clamp(1.0, 5.0),
            _ => self.base_rating,
        }
    }
}

/// Interpolates between `min` and `max`: rating 5 gives `min`, rating 1
/// gives `max`.
fn interpolate(rating: f64, min: i64, max: i64) -> f64 {
    min as f64 + ((4.0 - (rating - 1.0)) / 4.0) * (max - min) as f64
}

pub fn is_cool(cool_end: i64, now: i64) -> bool {
    now < cool_end
}

/// Cooldown length in seconds for `song` started at `now`.
pub fn song_cool_time(config: &CooldownConfig, song: &Song, now: i64) -> i64 {
    if let Some(cool_override) = song.cool_override {
        return cool_override;
    }
    let rating = config.effective_rating(song.rating, song.rating_count);
    let auto_cool = interpolate(rating, config.min_song_cool, config.max_song_cool);
    let cool = auto_cool * config.age.multiplier(song.added_on, now) * song.cool_multiply;
    cool.round() as i64
}

pub fn album_cool_time(config: &CooldownConfig, rating: Option<f64>, count: u32) -> i64 {
    let rating = config.effective_rating(rating, count);
    interpolate(rating, config.min_album_cool, config.max_album_cool).round() as i64
}

/// Outcome of a monotonic cooldown write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownWrite {
    Applied { cool_end: i64 },
    /// The stored cooldown already ended later.
    Skipped { attempted: i64 },
}

impl CooldownWrite {
    fn from_write(applied: bool, cool_end: i64) -> Self {
        if applied {
            CooldownWrite::Applied { cool_end }
        } else {
            CooldownWrite::Skipped {
                attempted: cool_end,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CooldownReport {
    pub writes: Vec<(EntityRef, CooldownWrite)>,
    pub request_only_end: Option<i64>,
    pub album_cool_lowest: Option<i64>,
}

impl CooldownReport {
    pub fn write_for(&self, entity: EntityRef) -> Option<CooldownWrite> {
        self.writes
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, w)| *w)
    }
}

/// Starts the cooldown of `song` on `sid`, then of its groups, then of its
/// album. Songs not present on `sid` are left alone.
pub fn start_cooldown(
    store: &dyn CatalogStore,
    config: &CooldownConfig,
    song: &Song,
    sid: u32,
    now: i64,
) -> Result<CooldownReport> {
    let mut report = CooldownReport::default();
    if song.sid != sid || !song.exists_on_station {
        debug!("Song {} not on station {}, no cooldown", song.id, sid);
        return Ok(report);
    }

    let cool_end = now + song_cool_time(config, song, now);
    let applied = store.extend_cool_end(EntityRef::Song(song.id), sid, cool_end)?;
    report
        .writes
        .push((EntityRef::Song(song.id), CooldownWrite::from_write(applied, cool_end)));

    let request_only_end = cool_end + config.request_only_period;
    store.set_request_only_end(song.id, sid, request_only_end)?;
    report.request_only_end = Some(request_only_end);

    let membership = store.get_membership(song.id)?;
    for group in membership.groups.iter().filter(|g| g.cooldown > 0) {
        let group_end = now + group.cooldown;
        let entity = EntityRef::Group(group.id);
        let applied = store.extend_cool_end(entity, sid, group_end)?;
        report
            .writes
            .push((entity, CooldownWrite::from_write(applied, group_end)));
    }

    if let Some(album) = membership.album {
        let album_end = now + album_cool_time(config, album.rating, album.rating_count);
        let entity = EntityRef::Album(album.id);
        let applied = store.extend_cool_end(entity, sid, album_end)?;
        report
            .writes
            .push((entity, CooldownWrite::from_write(applied, album_end)));
        report.album_cool_lowest = Some(store.refresh_album_cool_lowest(album.id, sid)?);
    }

    debug!(
        "Cooldown for song {} on station {}: {:?}",
        song.id, sid, report.writes
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::SqliteCatalogStore;
    use crate::storage::test_db::{insert_album, insert_group, insert_song, song_column};
    use crate::storage::SqliteStorage;
    use std::time::Duration;
    use tempfile::TempDir;

    fn song(rating: Option<f64>, count: u32) -> Song {
        Song {
            id: 1,
            sid: 1,
            origin_sid: 1,
            filename: "/music/1.mp3".to_string(),
            title: "One".to_string(),
            length: 200,
            added_on: 0,
            rating,
            rating_count: count,
            cool_override: None,
            cool_multiply: 1.0,
            replay_gain: None,
            album_id: None,
            exists_on_station: true,
            cool_end: 0,
            request_only_end: 0,
            elec_block_until: 0,
            elec_blocked_by: None,
            played_last: 0,
        }
    }

    fn config() -> CooldownConfig {
        CooldownConfig {
            min_song_cool: 600,
            max_song_cool: 3_600,
            base_rating: 3.0,
            ..CooldownConfig::default()
        }
    }

    #[test]
    fn unrated_song_gets_midpoint_cooldown() {
        assert_eq!(song_cool_time(&config(), &song(None, 0), 0), 2_100);
    }

    #[test]
    fn rating_bounds_map_to_min_and_max() {
        let config = config();
        assert_eq!(song_cool_time(&config, &song(Some(5.0), 50), 0), 600);
        assert_eq!(song_cool_time(&config, &song(Some(1.0), 50), 0), 3_600);
    }

    #[test]
    fn ratings_below_threshold_count_as_neutral() {
        let config = config();
        let neutral = song_cool_time(&config, &song(None, 0), 0);
        for rating in [1.0, 1.5, 2.2, 3.7, 4.9, 5.0] {
            for count in 0..=config.rating_threshold {
                assert_eq!(song_cool_time(&config, &song(Some(rating), count), 0), neutral);
            }
        }
    }

    #[test]
    fn zero_rating_counts_as_neutral() {
        let config = config();
        assert_eq!(song_cool_time(&config, &song(Some(0.0), 500), 0), 2_100);
    }

    #[test]
    fn override_bypasses_formula() {
        let mut s = song(Some(1.0), 50);
        s.cool_override = Some(42);
        s.cool_multiply = 3.0;
        assert_eq!(song_cool_time(&config(), &s, 0), 42);
    }

    #[test]
    fn multiplier_scales_cooldown() {
        let mut s = song(None, 0);
        s.cool_multiply = 2.0;
        assert_eq!(song_cool_time(&config(), &s, 0), 4_200);
    }

    #[test]
    fn age_multiplier_is_one_when_new_and_never_increases() {
        let curve = AgeCurve::default();
        assert_eq!(curve.multiplier(1_000, 1_000), 1.0);

        let mut previous = f64::MAX;
        for day in 0..800 {
            let m = curve.multiplier(0, day * 86_400);
            assert!(m <= previous, "multiplier went up on day {}", day);
            assert!(m >= curve.floor_multiplier);
            previous = m;
        }
        assert_eq!(curve.multiplier(0, 400 * 86_400), curve.floor_multiplier);
    }

    #[test]
    fn is_cool_is_strict() {
        assert!(is_cool(100, 99));
        assert!(!is_cool(100, 100));
    }

    fn storage() -> (TempDir, SqliteStorage) {
        let dir = TempDir::new().unwrap();
        let storage =
            SqliteStorage::open(dir.path().join("radio.db"), Duration::from_millis(50)).unwrap();
        (dir, storage)
    }

    #[test]
    fn start_cooldown_cascades_to_groups_and_album() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_album(conn, 9, 1);
        insert_song(conn, 1, 1, 200, Some(9));
        insert_song(conn, 2, 1, 200, Some(9));
        insert_group(conn, 4, 1, 900, None, &[1]);
        insert_group(conn, 5, 1, 0, None, &[1]);
        let store = SqliteCatalogStore::new(conn);

        let mut config = config();
        config.request_only_period = 300;
        let song = store.get_song(1, 1).unwrap().unwrap();
        let report = start_cooldown(&store, &config, &song, 1, 10_000).unwrap();

        assert_eq!(
            report.write_for(EntityRef::Song(1)),
            Some(CooldownWrite::Applied { cool_end: 12_100 })
        );
        assert_eq!(
            report.write_for(EntityRef::Group(4)),
            Some(CooldownWrite::Applied { cool_end: 10_900 })
        );
        assert_eq!(report.write_for(EntityRef::Group(5)), None);
        assert_eq!(
            report.write_for(EntityRef::Album(9)),
            Some(CooldownWrite::Applied {
                cool_end: 10_000 + album_cool_time(&config, None, 0)
            })
        );
        assert_eq!(report.request_only_end, Some(12_400));
        assert_eq!(song_column(conn, 1, 1, "request_only_end"), 12_400);
        // song 2 has never played, so the album's lowest cooldown is still 0
        assert_eq!(report.album_cool_lowest, Some(0));
    }

    #[test]
    fn shorter_cooldown_never_overwrites_longer_one() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 1, 1, 200, None);
        let store = SqliteCatalogStore::new(conn);
        store.extend_cool_end(EntityRef::Song(1), 1, 50_000).unwrap();

        let song = store.get_song(1, 1).unwrap().unwrap();
        let report = start_cooldown(&store, &config(), &song, 1, 10_000).unwrap();

        assert_eq!(
            report.write_for(EntityRef::Song(1)),
            Some(CooldownWrite::Skipped { attempted: 12_100 })
        );
        assert_eq!(song_column(conn, 1, 1, "cool_end"), 50_000);
    }

    #[test]
    fn song_from_other_station_is_untouched() {
        let (_dir, storage) = storage();
        let conn = storage.connection();
        insert_song(conn, 1, 2, 200, None);
        let store = SqliteCatalogStore::new(conn);

        let song = store.get_song(1, 2).unwrap().unwrap();
        let report = start_cooldown(&store, &config(), &song, 1, 10_000).unwrap();
        assert!(report.writes.is_empty());
        assert_eq!(song_column(conn, 1, 2, "cool_end"), 0);
    }
}
