//! Election blocks keep songs out of the next few elections of a station.
//!
//! Blocks are stored as an absolute threshold on the station's election
//! sequence, so they expire without any sweep: an election with sequence
//! `seq` may only contain entities whose threshold is below `seq`.

use super::models::{EntityRef, Membership, Song};
use super::store::CatalogStore;
use anyhow::Result;

pub fn is_blocked(elec_block_until: i64, election_seq: i64) -> bool {
    election_seq <= elec_block_until
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockReport {
    /// Entities whose threshold moved, with the new threshold.
    pub applied: Vec<(EntityRef, i64)>,
    /// Entities that already carried a later threshold.
    pub skipped: Vec<EntityRef>,
}

/// Blocks `song` (and its groups and album) from the next `num_elections`
/// elections created after `current_seq`.
pub fn start_election_block(
    store: &dyn CatalogStore,
    song: &Song,
    membership: &Membership,
    sid: u32,
    num_elections: u32,
    current_seq: i64,
    blocked_by: &str,
) -> Result<BlockReport> {
    let mut report = BlockReport::default();
    let mut block = |entity: EntityRef, count: u32| -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let until = current_seq + count as i64;
        if store.extend_elec_block(entity, sid, until, blocked_by)? {
            report.applied.push((entity, until));
        } else {
            report.skipped.push(entity);
        }
        Ok(())
    };

    block(EntityRef::Song(song.id), num_elections)?;
    for group in &membership.groups {
        block(
            EntityRef::Group(group.id),
            group.elec_block.unwrap_or(num_elections),
        )?;
    }
    if let Some(album) = &membership.album {
        block(EntityRef::Album(album.id), num_elections)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::SqliteCatalogStore;
    use crate::storage::test_db::{insert_album, insert_group, insert_song, song_column};
    use crate::storage::SqliteStorage;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn block_covers_exactly_the_next_elections() {
        // blocked at seq 4 for 2 elections: seq 5 and 6 excluded, 7 allowed
        let until = 4 + 2;
        assert!(is_blocked(until, 5));
        assert!(is_blocked(until, 6));
        assert!(!is_blocked(until, 7));
    }

    #[test]
    fn block_cascades_with_group_override() {
        let dir = TempDir::new().unwrap();
        let storage =
            SqliteStorage::open(dir.path().join("radio.db"), Duration::from_millis(50)).unwrap();
        let conn = storage.connection();
        insert_album(conn, 9, 1);
        insert_song(conn, 1, 1, 100, Some(9));
        insert_group(conn, 4, 1, 0, Some(5), &[1]);
        insert_group(conn, 6, 1, 0, None, &[1]);
        let store = SqliteCatalogStore::new(conn);

        let song = store.get_song(1, 1).unwrap().unwrap();
        let membership = store.get_membership(1).unwrap();
        let report = start_election_block(&store, &song, &membership, 1, 2, 10, "election").unwrap();

        assert_eq!(
            report.applied,
            vec![
                (EntityRef::Song(1), 12),
                (EntityRef::Group(4), 15),
                (EntityRef::Group(6), 12),
                (EntityRef::Album(9), 12),
            ]
        );
        assert_eq!(song_column(conn, 1, 1, "elec_block_until"), 12);
    }

    #[test]
    fn shorter_block_keeps_existing_threshold() {
        let dir = TempDir::new().unwrap();
        let storage =
            SqliteStorage::open(dir.path().join("radio.db"), Duration::from_millis(50)).unwrap();
        let conn = storage.connection();
        insert_song(conn, 1, 1, 100, None);
        let store = SqliteCatalogStore::new(conn);
        store
            .extend_elec_block(EntityRef::Song(1), 1, 30, "request")
            .unwrap();

        let song = store.get_song(1, 1).unwrap().unwrap();
        let report =
            start_election_block(&store, &song, &Membership::default(), 1, 2, 10, "election").unwrap();
        assert_eq!(report.skipped, vec![EntityRef::Song(1)]);
        assert_eq!(store.elec_block_until(EntityRef::Song(1), 1).unwrap(), 30);
    }
}
