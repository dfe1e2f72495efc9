//! Process-wide, read-mostly view of catalog sizes.
//!
//! Loaded once at startup and replaced only on an explicit refresh; the
//! advance path reads it but never writes it.

use super::models::Song;
use super::store::CatalogStore;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    songs_per_station: HashMap<u32, usize>,
    origin_songs_per_station: HashMap<u32, usize>,
    rated_songs: usize,
    pub loaded_at: i64,
}

impl CatalogSnapshot {
    pub fn load(store: &dyn CatalogStore, now: i64) -> Result<Self> {
        let mut snapshot = CatalogSnapshot {
            loaded_at: now,
            rated_songs: store.count_rated_songs()?,
            ..Default::default()
        };
        for count in store.song_counts()? {
            snapshot.songs_per_station.insert(count.sid, count.songs);
            snapshot
                .origin_songs_per_station
                .insert(count.sid, count.origin_songs);
        }
        Ok(snapshot)
    }

    pub fn num_songs(&self, sid: u32) -> usize {
        self.songs_per_station.get(&sid).copied().unwrap_or(0)
    }

    pub fn num_origin_songs(&self, sid: u32) -> usize {
        self.origin_songs_per_station
            .get(&sid)
            .copied()
            .unwrap_or(0)
    }

    pub fn rated_songs(&self) -> usize {
        self.rated_songs
    }

    /// Percentile of a 1-based rating rank among rated songs, kept within
    /// 5..=99 so no song reads as "top 100%" or "bottom 0%".
    pub fn rank_percentile(&self, rank: usize) -> u8 {
        if self.rated_songs == 0 {
            return 5;
        }
        let total = self.rated_songs as f64;
        let percentile = (total - rank as f64) / total * 100.0;
        percentile.clamp(5.0, 99.0) as u8
    }
}

/// Where a song stands in the rating ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SongStanding {
    pub rating_rank: usize,
    pub rating_rank_percentile: u8,
    /// When the song's album next has a song off cooldown, from the album's
    /// cached `cool_lowest`.
    pub album_available_at: Option<i64>,
}

pub fn song_standing(
    store: &dyn CatalogStore,
    snapshot: &CatalogSnapshot,
    song: &Song,
) -> Result<Option<SongStanding>> {
    let Some(rating) = song.rating else {
        return Ok(None);
    };
    let rank = store.count_rated_above(rating)? + 1;
    let album_available_at = match song.album_id {
        Some(album_id) => Some(store.album_cool_lowest(album_id, song.sid)?),
        None => None,
    };
    Ok(Some(SongStanding {
        rating_rank: rank,
        rating_rank_percentile: snapshot.rank_percentile(rank),
        album_available_at,
    }))
}

#[derive(Default)]
pub struct SnapshotCache {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl SnapshotCache {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn current(&self) -> Arc<CatalogSnapshot> {
        self.current.read().unwrap().clone()
    }

    pub fn replace(&self, snapshot: CatalogSnapshot) {
        *self.current.write().unwrap() = Arc::new(snapshot);
    }
}
