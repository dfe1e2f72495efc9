//! Connection lifecycle for the station database.
//!
//! Every station worker owns one [`SqliteStorage`]. Writes go through
//! [`SqliteStorage::transaction`], which takes the write lock up front so a
//! busy database surfaces at `BEGIN` rather than halfway through an advance.

mod schema;

pub use schema::RADIO_VERSIONED_SCHEMAS;

use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteStorage {
    path: PathBuf,
    busy_timeout: Duration,
    conn: Connection,
    reconnects: u64,
}

impl SqliteStorage {
    /// Opens (creating or migrating if needed) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Self::connect(&path, busy_timeout)?;
        Ok(Self {
            path,
            busy_timeout,
            conn,
            reconnects: 0,
        })
    }

    fn connect(path: &Path, busy_timeout: Duration) -> Result<Connection> {
        let conn = open_versioned(path, RADIO_VERSIONED_SCHEMAS)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journal")?;
        debug!("Opened {:?} (journal_mode={})", path, mode);
        conn.busy_timeout(busy_timeout)?;
        Ok(conn)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the current connection and opens a fresh one.
    pub fn reconnect(&mut self) -> Result<()> {
        let fresh = Self::connect(&self.path, self.busy_timeout)?;
        let stale = std::mem::replace(&mut self.conn, fresh);
        if let Err((_, e)) = stale.close() {
            debug!("Error closing stale connection: {}", e);
        }
        self.reconnects += 1;
        info!("Reconnected to {:?} ({} total)", self.path, self.reconnects);
        Ok(())
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Runs `f` in an immediate transaction. The transaction is committed
    /// when `f` succeeds and rolled back otherwise.
    pub fn transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
