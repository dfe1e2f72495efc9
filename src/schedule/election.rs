//! Elections: a fixed pool of candidates, vote tallies and a resolution.

use super::error::ScheduleError;
use super::models::ElectionFlavor;
use crate::catalog::Song;
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ElectionEntry {
    pub id: i64,
    pub song: Song,
    /// Order in the pool, starting at 0.
    pub position: u32,
    pub votes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Election {
    pub id: i64,
    pub sid: u32,
    /// Station election sequence number this election was created with.
    pub seq: i64,
    pub flavor: ElectionFlavor,
    pub entries: Vec<ElectionEntry>,
    pub opened_at: i64,
    pub resolved_at: Option<i64>,
    winner: Option<usize>,
}

/// Index of the winning entry: most votes, ties going to the earliest
/// position in the pool.
pub fn pick_winner(entries: &[ElectionEntry]) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .min_by_key(|(_, entry)| (Reverse(entry.votes), entry.position))
        .map(|(index, _)| index)
}

impl Election {
    pub fn new(
        id: i64,
        sid: u32,
        seq: i64,
        flavor: ElectionFlavor,
        entries: Vec<ElectionEntry>,
        opened_at: i64,
    ) -> Self {
        Self {
            id,
            sid,
            seq,
            flavor,
            entries,
            opened_at,
            resolved_at: None,
            winner: None,
        }
    }

    /// Rebuilds an already resolved election.
    pub fn resolved(mut self, winner_entry_id: i64, resolved_at: i64) -> Self {
        self.winner = self.entries.iter().position(|e| e.id == winner_entry_id);
        self.resolved_at = Some(resolved_at);
        self
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    pub fn apply_tallies(&mut self, tallies: &HashMap<i64, u32>) {
        for entry in &mut self.entries {
            entry.votes = tallies.get(&entry.id).copied().unwrap_or(0);
        }
    }

    pub fn resolve(&mut self, now: i64) -> Result<&ElectionEntry, ScheduleError> {
        if !self.is_open() {
            return Err(ScheduleError::invalid_state(format!(
                "election {} resolved twice",
                self.id
            )));
        }
        let winner = pick_winner(&self.entries).ok_or_else(|| {
            ScheduleError::invalid_state(format!("election {} has no entries", self.id))
        })?;
        self.winner = Some(winner);
        self.resolved_at = Some(now);
        Ok(&self.entries[winner])
    }

    pub fn winner(&self) -> Option<&ElectionEntry> {
        self.winner.map(|index| &self.entries[index])
    }

    pub fn losers(&self) -> impl Iterator<Item = &ElectionEntry> {
        let winner = self.winner;
        self.entries
            .iter()
            .enumerate()
            .filter(move |(index, _)| winner.is_some() && Some(*index) != winner)
            .map(|(_, entry)| entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: i64) -> Song {
        Song {
            id,
            sid: 1,
            origin_sid: 1,
            filename: format!("/music/{}.mp3", id),
            title: format!("Song {}", id),
            length: 180,
            added_on: 0,
            rating: None,
            rating_count: 0,
            cool_override: None,
            cool_multiply: 1.0,
            replay_gain: None,
            album_id: None,
            exists_on_station: true,
            cool_end: 0,
            request_only_end: 0,
            elec_block_until: 0,
            elec_blocked_by: None,
            played_last: 0,
        }
    }

    fn election(votes: &[u32]) -> Election {
        let entries = votes
            .iter()
            .enumerate()
            .map(|(i, v)| ElectionEntry {
                id: 100 + i as i64,
                song: song(i as i64 + 1),
                position: i as u32,
                votes: *v,
            })
            .collect();
        Election::new(7, 1, 3, ElectionFlavor::General, entries, 0)
    }

    #[test]
    fn most_votes_wins() {
        let mut e = election(&[2, 9, 4]);
        assert_eq!(e.resolve(10).unwrap().song.id, 2);
        let losers: Vec<i64> = e.losers().map(|l| l.song.id).collect();
        assert_eq!(losers, vec![1, 3]);
    }

    #[test]
    fn tie_goes_to_earliest_position() {
        let mut e = election(&[1, 5, 5]);
        assert_eq!(e.resolve(10).unwrap().song.id, 2);

        let mut silent = election(&[0, 0, 0]);
        assert_eq!(silent.resolve(10).unwrap().song.id, 1);
    }

    #[test]
    fn resolution_is_deterministic() {
        for _ in 0..20 {
            let mut e = election(&[3, 7, 7, 1]);
            assert_eq!(e.resolve(10).unwrap().id, 101);
        }
    }

    #[test]
    fn tallies_replace_votes() {
        let mut e = election(&[0, 0, 0]);
        e.apply_tallies(&HashMap::from([(102, 4), (100, 1)]));
        assert_eq!(e.resolve(10).unwrap().id, 102);
    }

    #[test]
    fn cannot_resolve_twice_or_empty() {
        let mut e = election(&[1]);
        e.resolve(10).unwrap();
        assert!(e.resolve(11).unwrap_err().is_fatal());

        let mut empty = election(&[]);
        assert!(empty.resolve(10).is_err());
    }

    #[test]
    fn open_election_has_no_losers() {
        let e = election(&[1, 2]);
        assert!(e.is_open());
        assert_eq!(e.losers().count(), 0);
    }
}
