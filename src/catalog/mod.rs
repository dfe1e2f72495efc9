//! Song catalog as the scheduler sees it: eligibility queries, cooldowns,
//! election blocks and ratings.

pub mod cooldown;
pub mod election_block;
mod models;
pub mod rating;
pub mod reconcile;
pub mod snapshot;
mod store;

pub use cooldown::{start_cooldown, CooldownConfig, CooldownReport, CooldownWrite};
pub use models::{
    Album, CandidateFilter, CandidateOrder, EligibilityQuery, EntityRef, Membership,
    RatingSummary, RatingTally, Song, SongGroup,
};
pub use snapshot::{CatalogSnapshot, SnapshotCache, SongStanding};
pub use store::{take_distinct_albums, CatalogStore, SqliteCatalogStore, StationSongCount};
