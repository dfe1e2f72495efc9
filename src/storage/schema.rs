//! SQLite schema definitions for the station database.
//!
//! A single database holds the song catalog columns the scheduler owns
//! (cooldowns, election blocks, ratings), the producer/election tables and
//! the per-station bookkeeping, so one advance commits in one transaction.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Catalog, schedule and station state
// =============================================================================

const SONGS_TABLE_V1: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("filename", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("length", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("origin_sid", &SqlType::Integer, non_null = true),
        sqlite_column!("added_on", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("rating", &SqlType::Real),
        sqlite_column!("rating_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("cool_override", &SqlType::Integer),
        sqlite_column!("cool_multiply", &SqlType::Real, non_null = true, default_value = Some("1.0")),
        sqlite_column!("replay_gain", &SqlType::Text),
        sqlite_column!("album_id", &SqlType::Integer),
    ],
    indices: &[("idx_songs_album", "album_id")],
    unique_constraints: &[],
};

/// Per-station view of a song: presence, cooldown and election block.
const SONG_STATIONS_TABLE_V1: Table = Table {
    name: "song_stations",
    columns: &[
        sqlite_column!("song_id", &SqlType::Integer, non_null = true),
        sqlite_column!("sid", &SqlType::Integer, non_null = true),
        sqlite_column!("exists_on_station", &SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("cool_end", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("request_only_end", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("elec_block_until", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("elec_blocked_by", &SqlType::Text),
        sqlite_column!("played_last", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[("idx_song_stations_sid", "sid, exists_on_station")],
    unique_constraints: &[&["song_id", "sid"]],
};

const SONG_RATINGS_TABLE_V1: Table = Table {
    name: "song_ratings",
    columns: &[
        sqlite_column!("song_id", &SqlType::Integer, non_null = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("rating", &SqlType::Real, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["song_id", "user_id"]],
};

const GROUPS_TABLE_V1: Table = Table {
    name: "song_groups",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("cooldown", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("elec_block", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

const GROUP_MEMBERS_TABLE_V1: Table = Table {
    name: "group_members",
    columns: &[
        sqlite_column!("group_id", &SqlType::Integer, non_null = true),
        sqlite_column!("song_id", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_group_members_song", "song_id")],
    unique_constraints: &[&["group_id", "song_id"]],
};

const GROUP_STATIONS_TABLE_V1: Table = Table {
    name: "group_stations",
    columns: &[
        sqlite_column!("group_id", &SqlType::Integer, non_null = true),
        sqlite_column!("sid", &SqlType::Integer, non_null = true),
        sqlite_column!("cool_end", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("elec_block_until", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[],
    unique_constraints: &[&["group_id", "sid"]],
};

const ALBUMS_TABLE_V1: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("rating", &SqlType::Real),
        sqlite_column!("rating_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ALBUM_STATIONS_TABLE_V1: Table = Table {
    name: "album_stations",
    columns: &[
        sqlite_column!("album_id", &SqlType::Integer, non_null = true),
        sqlite_column!("sid", &SqlType::Integer, non_null = true),
        sqlite_column!("cool_end", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("cool_lowest", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("elec_block_until", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[],
    unique_constraints: &[&["album_id", "sid"]],
};

const PRODUCERS_TABLE_V1: Table = Table {
    name: "producers",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("sid", &SqlType::Integer, non_null = true),
        sqlite_column!("producer_type", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("start_time", &SqlType::Integer, non_null = true),
        sqlite_column!("end_time", &SqlType::Integer, non_null = true),
        sqlite_column!("state", &SqlType::Text, non_null = true, default_value = Some("'scheduled'")),
        sqlite_column!("use_crossfade", &SqlType::Text, non_null = true, default_value = Some("'on'")),
        sqlite_column!("use_tag_suffix", &SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("is_filler", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("params", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[("idx_producers_sid_state", "sid, state, start_time")],
    unique_constraints: &[],
};

const ELECTIONS_TABLE_V1: Table = Table {
    name: "elections",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("producer_id", &SqlType::Integer, non_null = true),
        sqlite_column!("sid", &SqlType::Integer, non_null = true),
        sqlite_column!("flavor", &SqlType::Text, non_null = true),
        sqlite_column!("seq", &SqlType::Integer, non_null = true),
        sqlite_column!("opened_at", &SqlType::Integer, non_null = true),
        sqlite_column!("resolved_at", &SqlType::Integer),
        sqlite_column!("winner_entry_id", &SqlType::Integer),
    ],
    indices: &[
        ("idx_elections_producer", "producer_id"),
        ("idx_elections_open", "sid, resolved_at"),
    ],
    unique_constraints: &[],
};

const ELECTION_ENTRIES_TABLE_V1: Table = Table {
    name: "election_entries",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("election_id", &SqlType::Integer, non_null = true),
        sqlite_column!("song_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("votes", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[("idx_election_entries_election", "election_id")],
    unique_constraints: &[&["election_id", "song_id"]],
};

/// Station key/value state: pause flag, heartbeat and pause title.
const STATION_STATE_TABLE_V1: Table = Table {
    name: "station_state",
    columns: &[
        sqlite_column!("sid", &SqlType::Integer, non_null = true),
        sqlite_column!("key", &SqlType::Text, non_null = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["sid", "key"]],
};

const STATION_COUNTERS_TABLE_V1: Table = Table {
    name: "station_counters",
    columns: &[
        sqlite_column!("sid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("election_seq", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Play history
// =============================================================================

const EVENT_HISTORY_TABLE_V2: Table = Table {
    name: "event_history",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("sid", &SqlType::Integer, non_null = true),
        sqlite_column!("producer_id", &SqlType::Integer, non_null = true),
        sqlite_column!("song_id", &SqlType::Integer, non_null = true),
        sqlite_column!("played_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_event_history_sid_played", "sid, played_at")],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    EVENT_HISTORY_TABLE_V2.create(conn)
}

// =============================================================================
// Version 3 - Vote counts and album play times
// =============================================================================

const SONGS_TABLE_V3: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("filename", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("length", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("origin_sid", &SqlType::Integer, non_null = true),
        sqlite_column!("added_on", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("rating", &SqlType::Real),
        sqlite_column!("rating_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("cool_override", &SqlType::Integer),
        sqlite_column!("cool_multiply", &SqlType::Real, non_null = true, default_value = Some("1.0")),
        sqlite_column!("replay_gain", &SqlType::Text),
        sqlite_column!("album_id", &SqlType::Integer),
        sqlite_column!("vote_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[("idx_songs_album", "album_id")],
    unique_constraints: &[],
};

const ALBUM_STATIONS_TABLE_V3: Table = Table {
    name: "album_stations",
    columns: &[
        sqlite_column!("album_id", &SqlType::Integer, non_null = true),
        sqlite_column!("sid", &SqlType::Integer, non_null = true),
        sqlite_column!("cool_end", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("cool_lowest", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("elec_block_until", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("played_last", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[],
    unique_constraints: &[&["album_id", "sid"]],
};

fn migrate_v2_to_v3(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "ALTER TABLE songs ADD COLUMN vote_count INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    conn.execute(
        "ALTER TABLE album_stations ADD COLUMN played_last INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

pub const RADIO_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            SONGS_TABLE_V1,
            SONG_STATIONS_TABLE_V1,
            SONG_RATINGS_TABLE_V1,
            GROUPS_TABLE_V1,
            GROUP_MEMBERS_TABLE_V1,
            GROUP_STATIONS_TABLE_V1,
            ALBUMS_TABLE_V1,
            ALBUM_STATIONS_TABLE_V1,
            PRODUCERS_TABLE_V1,
            ELECTIONS_TABLE_V1,
            ELECTION_ENTRIES_TABLE_V1,
            STATION_STATE_TABLE_V1,
            STATION_COUNTERS_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            SONGS_TABLE_V1,
            SONG_STATIONS_TABLE_V1,
            SONG_RATINGS_TABLE_V1,
            GROUPS_TABLE_V1,
            GROUP_MEMBERS_TABLE_V1,
            GROUP_STATIONS_TABLE_V1,
            ALBUMS_TABLE_V1,
            ALBUM_STATIONS_TABLE_V1,
            PRODUCERS_TABLE_V1,
            ELECTIONS_TABLE_V1,
            ELECTION_ENTRIES_TABLE_V1,
            STATION_STATE_TABLE_V1,
            STATION_COUNTERS_TABLE_V1,
            EVENT_HISTORY_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
    VersionedSchema {
        version: 3,
        tables: &[
            SONGS_TABLE_V3,
            SONG_STATIONS_TABLE_V1,
            SONG_RATINGS_TABLE_V1,
            GROUPS_TABLE_V1,
            GROUP_MEMBERS_TABLE_V1,
            GROUP_STATIONS_TABLE_V1,
            ALBUMS_TABLE_V1,
            ALBUM_STATIONS_TABLE_V3,
            PRODUCERS_TABLE_V1,
            ELECTIONS_TABLE_V1,
            ELECTION_ENTRIES_TABLE_V1,
            STATION_STATE_TABLE_V1,
            STATION_COUNTERS_TABLE_V1,
            EVENT_HISTORY_TABLE_V2,
        ],
        migration: Some(migrate_v2_to_v3),
    },
];
