//! Aggregates per-user ratings into a single 1-5 rating.

use super::models::{EntityRef, RatingSummary, RatingTally};
use super::store::CatalogStore;
use anyhow::Result;

/// Weight of a single vote, linear from 0.0 at score 1 to 1.0 at score 5.
fn point_weight(score: f64) -> f64 {
    (score.clamp(1.0, 5.0) - 1.0) / 4.0
}

/// Returns `(points, potential_points)` for a set of tallies.
pub fn rating_calculator(tallies: &[RatingTally]) -> (f64, u32) {
    tallies.iter().fold((0.0, 0), |(points, potential), tally| {
        (
            points + point_weight(tally.score) * tally.count as f64,
            potential + tally.count,
        )
    })
}

/// Rating in [1, 5], or `None` when `potential` is not above `threshold`.
pub fn normalized_rating(points: f64, potential: u32, threshold: u32) -> Option<f64> {
    if potential == 0 || potential <= threshold {
        return None;
    }
    Some(((points / potential as f64) * 4.0 + 1.0).clamp(1.0, 5.0))
}

/// Recomputes and stores the rating of a song or album from its user
/// ratings.
pub fn update_rating(
    store: &dyn CatalogStore,
    entity: EntityRef,
    threshold: u32,
) -> Result<RatingSummary> {
    let tallies = store.rating_tallies(entity)?;
    let (points, potential) = rating_calculator(&tallies);
    let summary = RatingSummary {
        rating: normalized_rating(points, potential, threshold),
        count: potential,
    };
    store.set_rating(entity, summary)?;
    Ok(summary)
}

pub fn update_song_rating(
    store: &dyn CatalogStore,
    song_id: i64,
    threshold: u32,
) -> Result<RatingSummary> {
    update_rating(store, EntityRef::Song(song_id), threshold)
}

/// Album ratings aggregate the user ratings of every member song.
pub fn update_album_rating(
    store: &dyn CatalogStore,
    album_id: i64,
    threshold: u32,
) -> Result<RatingSummary> {
    update_rating(store, EntityRef::Album(album_id), threshold)
}
