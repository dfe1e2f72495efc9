//! Database fixtures written straight through rusqlite.

#![allow(dead_code)]

use super::constants::song_filename;
use rusqlite::{params, Connection};

pub fn insert_song(conn: &Connection, id: i64, sid: u32) {
    conn.execute(
        "INSERT INTO songs (id, filename, title, length, origin_sid, added_on)
         VALUES (?1, ?2, ?3, 180, ?4, 0)",
        params![id, song_filename(id), format!("Song {}", id), sid],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO song_stations (song_id, sid) VALUES (?1, ?2)",
        params![id, sid],
    )
    .unwrap();
}

pub fn insert_user_rating(conn: &Connection, song_id: i64, user_id: i64, rating: f64) {
    conn.execute(
        "INSERT INTO song_ratings (song_id, user_id, rating) VALUES (?1, ?2, ?3)",
        params![song_id, user_id, rating],
    )
    .unwrap();
}

pub fn song_column(conn: &Connection, song_id: i64, sid: u32, column: &str) -> i64 {
    conn.query_row(
        &format!(
            "SELECT {} FROM song_stations WHERE song_id = ?1 AND sid = ?2",
            column
        ),
        params![song_id, sid],
        |row| row.get(0),
    )
    .unwrap()
}
