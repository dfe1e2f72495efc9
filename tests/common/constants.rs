//! Fixed identifiers shared by the end-to-end tests.

#![allow(dead_code)]

pub const STATION_ID: u32 = 1;
pub const OTHER_STATION_ID: u32 = 2;
pub const UNKNOWN_STATION_ID: u32 = 99;

pub const PAUSE_FILE: &str = "/srv/radio/pause.mp3";

/// Songs seeded on `STATION_ID`.
pub const STATION_SONGS: [i64; 3] = [101, 102, 103];

/// Song seeded on `OTHER_STATION_ID` only.
pub const OTHER_STATION_SONG: i64 = 201;

pub fn song_filename(song_id: i64) -> String {
    format!("/music/{}.mp3", song_id)
}
