use serde::{Deserialize, Serialize};
use std::fmt;

/// A song as seen from one station.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub id: i64,
    /// Station this view was loaded for.
    pub sid: u32,
    pub origin_sid: u32,
    pub filename: String,
    pub title: String,
    /// Seconds.
    pub length: u32,
    pub added_on: i64,
    pub rating: Option<f64>,
    pub rating_count: u32,
    pub cool_override: Option<i64>,
    pub cool_multiply: f64,
    pub replay_gain: Option<String>,
    pub album_id: Option<i64>,
    pub exists_on_station: bool,
    pub cool_end: i64,
    pub request_only_end: i64,
    pub elec_block_until: i64,
    pub elec_blocked_by: Option<String>,
    pub played_last: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongGroup {
    pub id: i64,
    pub name: String,
    /// Seconds; zero means the group carries no cooldown.
    pub cooldown: i64,
    /// Overrides the station's election block length for members.
    pub elec_block: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub rating: Option<f64>,
    pub rating_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Membership {
    pub groups: Vec<SongGroup>,
    pub album: Option<Album>,
}

/// Anything that carries a cooldown or an election block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Song(i64),
    Group(i64),
    Album(i64),
}

impl EntityRef {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityRef::Song(_) => "song",
            EntityRef::Group(_) => "group",
            EntityRef::Album(_) => "album",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            EntityRef::Song(id) | EntityRef::Group(id) | EntityRef::Album(id) => *id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingTally {
    pub score: f64,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub rating: Option<f64>,
    pub count: u32,
}

/// Primary sort key for candidate pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrder {
    Shortest,
    LeastRecentlyPlayed,
}

/// Optional restrictions an election producer places on its pool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateFilter {
    pub max_length: Option<u32>,
    pub min_rating: Option<f64>,
    pub group_id: Option<i64>,
}

/// Everything [`super::CatalogStore::find_eligible`] needs to build a pool.
#[derive(Debug, Clone)]
pub struct EligibilityQuery<'a> {
    pub sid: u32,
    pub now: i64,
    /// Sequence number the election being built will get.
    pub election_seq: i64,
    pub order: CandidateOrder,
    pub filter: &'a CandidateFilter,
    pub limit: usize,
}
