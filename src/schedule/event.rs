use super::annotation::{Annotation, AnnotationLabel};
use super::election::Election;
use super::models::Crossfade;
use crate::catalog::Song;

/// Deterministic event: songs play in the listed order.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedListEvent {
    pub songs: Vec<Song>,
    /// Index of each loaded song in the producer's full list, which may
    /// name songs the station no longer carries.
    pub slots: Vec<usize>,
    /// Index into `songs` of the song currently playing; `None` before the
    /// first.
    pub cursor: Option<usize>,
}

impl FixedListEvent {
    pub fn new(songs: Vec<Song>) -> Self {
        let slots = (0..songs.len()).collect();
        Self {
            songs,
            slots,
            cursor: None,
        }
    }

    /// Builds the event from `(slot, song)` pairs in list order.
    pub fn with_slots(entries: Vec<(usize, Song)>) -> Self {
        let (slots, songs) = entries.into_iter().unzip();
        Self {
            songs,
            slots,
            cursor: None,
        }
    }

    /// Moves to the next song. Returns `false` once the list is used up.
    pub fn step(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next < self.songs.len() {
            self.cursor = Some(next);
            true
        } else {
            false
        }
    }

    pub fn playing(&self) -> Option<&Song> {
        self.cursor.and_then(|c| self.songs.get(c))
    }

    /// Slot of the song currently playing.
    pub fn slot(&self) -> Option<usize> {
        self.cursor.and_then(|c| self.slots.get(c).copied())
    }

    /// Puts the cursor on the last loaded song at or before `slot`, so the
    /// next step plays whatever follows it in the full list.
    pub fn seek(&mut self, slot: usize) {
        self.cursor = self.slots.iter().rposition(|s| *s <= slot);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    FixedList(FixedListEvent),
    Election(Election),
}

/// What a producer resolves into: one or more songs to hand to the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub producer_id: i64,
    pub name: Option<String>,
    pub use_crossfade: Crossfade,
    pub use_tag_suffix: bool,
    pub body: EventBody,
}

impl Event {
    /// Song currently playing, if the event has been resolved.
    pub fn playing_song(&self) -> Option<&Song> {
        match &self.body {
            EventBody::FixedList(list) => list.playing(),
            EventBody::Election(election) => election.winner().map(|entry| &entry.song),
        }
    }

    pub fn filename(&self) -> Option<&str> {
        self.playing_song().map(|song| song.filename.as_str())
    }

    pub fn election(&self) -> Option<&Election> {
        match &self.body {
            EventBody::Election(election) => Some(election),
            EventBody::FixedList(_) => None,
        }
    }

    pub fn annotation(&self, stream_suffix: Option<&str>) -> Option<Annotation> {
        let song = self.playing_song()?;
        let label = match (self.use_tag_suffix, stream_suffix, &self.name) {
            (true, Some(suffix), _) => Some(AnnotationLabel::Suffix(suffix.to_string())),
            (_, _, Some(name)) => Some(AnnotationLabel::Title(name.clone())),
            _ => None,
        };
        Some(Annotation {
            crossfade: self.use_crossfade,
            use_suffix: self.use_tag_suffix,
            label,
            replay_gain: song.replay_gain.clone(),
            filename: song.filename.clone(),
        })
    }

    /// What the encoder receives: the bare filename, or the annotated form.
    pub fn playable(&self, annotate: bool, stream_suffix: Option<&str>) -> Option<String> {
        if annotate {
            self.annotation(stream_suffix).map(|a| a.to_string())
        } else {
            self.filename().map(str::to_string)
        }
    }
}
