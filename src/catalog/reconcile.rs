//! Explicit repair pass for cached album state.
//!
//! `cool_lowest` is maintained incrementally when songs start their
//! cooldown. Anything that touches songs outside the scheduler (imports,
//! deletions) can leave it stale, so station workers run this pass at
//! startup and failures are collected per album rather than aborting.

use super::store::CatalogStore;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFailure {
    pub album_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub checked: usize,
    /// (album id, stale value, corrected value)
    pub corrected: Vec<(i64, i64, i64)>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn reconcile_albums(store: &dyn CatalogStore, sid: u32) -> anyhow::Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    for album_id in store.album_ids(sid)? {
        report.checked += 1;
        let outcome = store.album_cool_lowest(album_id, sid).and_then(|stale| {
            store
                .refresh_album_cool_lowest(album_id, sid)
                .map(|fresh| (stale, fresh))
        });
        match outcome {
            Ok((stale, fresh)) if stale != fresh => {
                report.corrected.push((album_id, stale, fresh));
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to reconcile album {} on station {}: {:#}", album_id, sid, e);
                report.failures.push(ReconcileFailure {
                    album_id,
                    error: format!("{:#}", e),
                });
            }
        }
    }
    info!(
        "Reconciled {} albums on station {}: {} corrected, {} failed",
        report.checked,
        sid,
        report.corrected.len(),
        report.failures.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::EntityRef;
    use crate::catalog::store::SqliteCatalogStore;
    use crate::storage::test_db::{insert_album, insert_song};
    use crate::storage::SqliteStorage;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn stale_cool_lowest_is_corrected() {
        let dir = TempDir::new().unwrap();
        let storage =
            SqliteStorage::open(dir.path().join("radio.db"), Duration::from_millis(50)).unwrap();
        let conn = storage.connection();
        insert_album(conn, 9, 1);
        insert_album(conn, 10, 1);
        insert_song(conn, 1, 1, 100, Some(9));
        insert_song(conn, 2, 1, 100, Some(9));
        insert_song(conn, 3, 1, 100, Some(10));
        let store = SqliteCatalogStore::new(conn);
        store.extend_cool_end(EntityRef::Song(1), 1, 500).unwrap();
        store.extend_cool_end(EntityRef::Song(2), 1, 700).unwrap();
        conn.execute(
            "UPDATE album_stations SET cool_lowest = 99 WHERE album_id = 9",
            [],
        )
        .unwrap();

        let report = reconcile_albums(&store, 1).unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.corrected, vec![(9, 99, 500)]);
        assert!(report.is_clean());
        assert_eq!(store.album_cool_lowest(9, 1).unwrap(), 500);
    }
}
