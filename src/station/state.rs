//! Per-station key/value flags kept in `station_state`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Set by operator tooling; the station plays the pause placeholder while it
/// holds a truthy value.
pub const BACKEND_PAUSED: &str = "backend_paused";
/// When the current pause started.
pub const PAUSE_HEARTBEAT_START: &str = "pause_heartbeat_start";
/// The placeholder is what the station is playing right now.
pub const PAUSED_PLAYING: &str = "paused_playing";
/// Title shown with the placeholder when annotations are on.
pub const PAUSE_TITLE: &str = "pause_title";

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "yes" | "on")
}

pub struct StationStateStore<'c> {
    conn: &'c Connection,
}

impl<'c> StationStateStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, sid: u32, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM station_state WHERE sid = ?1 AND key = ?2",
                params![sid, key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read {} for station {}", key, sid))
    }

    pub fn set(&self, sid: u32, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO station_state (sid, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (sid, key) DO UPDATE SET value = excluded.value",
                params![sid, key, value],
            )
            .with_context(|| format!("Failed to write {} for station {}", key, sid))?;
        Ok(())
    }

    /// Removes `key`, returning whether it was set.
    pub fn clear(&self, sid: u32, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM station_state WHERE sid = ?1 AND key = ?2",
                params![sid, key],
            )
            .with_context(|| format!("Failed to clear {} for station {}", key, sid))?;
        Ok(removed > 0)
    }

    pub fn flag(&self, sid: u32, key: &str) -> Result<bool> {
        Ok(self.get(sid, key)?.is_some_and(|v| is_truthy(&v)))
    }

    pub fn is_paused(&self, sid: u32) -> Result<bool> {
        self.flag(sid, BACKEND_PAUSED)
    }

    pub fn set_paused(&self, sid: u32, paused: bool) -> Result<()> {
        self.set(sid, BACKEND_PAUSED, if paused { "1" } else { "0" })
    }

    pub fn pause_title(&self, sid: u32) -> Result<Option<String>> {
        Ok(self.get(sid, PAUSE_TITLE)?.filter(|t| !t.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn flags_are_per_station() {
        let dir = TempDir::new().unwrap();
        let storage =
            SqliteStorage::open(dir.path().join("radio.db"), Duration::from_millis(50)).unwrap();
        let state = StationStateStore::new(storage.connection());

        assert!(!state.is_paused(1).unwrap());
        state.set_paused(1, true).unwrap();
        assert!(state.is_paused(1).unwrap());
        assert!(!state.is_paused(2).unwrap());

        state.set(1, BACKEND_PAUSED, "false").unwrap();
        assert!(!state.is_paused(1).unwrap());

        assert!(state.clear(1, BACKEND_PAUSED).unwrap());
        assert!(!state.clear(1, BACKEND_PAUSED).unwrap());
        assert_eq!(state.get(1, BACKEND_PAUSED).unwrap(), None);
    }

    #[test]
    fn blank_pause_title_is_ignored() {
        let dir = TempDir::new().unwrap();
        let storage =
            SqliteStorage::open(dir.path().join("radio.db"), Duration::from_millis(50)).unwrap();
        let state = StationStateStore::new(storage.connection());

        state.set(1, PAUSE_TITLE, "  ").unwrap();
        assert_eq!(state.pause_title(1).unwrap(), None);
        state.set(1, PAUSE_TITLE, "Back soon").unwrap();
        assert_eq!(state.pause_title(1).unwrap().as_deref(), Some("Back soon"));
    }
}
