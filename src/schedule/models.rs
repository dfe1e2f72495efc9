use crate::catalog::{CandidateFilter, CandidateOrder};
use serde::{Deserialize, Serialize};

/// Producer lifecycle. Transitions only move forward:
/// scheduled -> producing -> current -> archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Scheduled,
    Producing,
    Current,
    Archived,
}

impl ProducerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProducerState::Scheduled => "scheduled",
            ProducerState::Producing => "producing",
            ProducerState::Current => "current",
            ProducerState::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(ProducerState::Scheduled),
            "producing" => Some(ProducerState::Producing),
            "current" => Some(ProducerState::Current),
            "archived" => Some(ProducerState::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionFlavor {
    /// Least recently played songs first.
    General,
    /// Shortest songs first, used to fill gaps before a timed event.
    Shortest,
}

impl ElectionFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElectionFlavor::General => "general",
            ElectionFlavor::Shortest => "shortest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "general" => Some(ElectionFlavor::General),
            "shortest" => Some(ElectionFlavor::Shortest),
            _ => None,
        }
    }

    pub fn order(&self) -> CandidateOrder {
        match self {
            ElectionFlavor::General => CandidateOrder::LeastRecentlyPlayed,
            ElectionFlavor::Shortest => CandidateOrder::Shortest,
        }
    }
}

/// What a producer turns into when it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerKind {
    /// Plays the listed songs in order, no voting.
    FixedList { song_ids: Vec<i64> },
    /// Lets listeners vote among a pool of candidates.
    Election {
        flavor: ElectionFlavor,
        #[serde(default)]
        filter: CandidateFilter,
    },
}

impl ProducerKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ProducerKind::FixedList { .. } => "fixed_list",
            ProducerKind::Election { .. } => "election",
        }
    }
}

/// Crossfade setting handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossfade {
    Off,
    On,
    /// Custom crossfade length in seconds.
    Seconds(u32),
}

impl Crossfade {
    pub fn as_str(&self) -> String {
        match self {
            Crossfade::Off => "off".to_string(),
            Crossfade::On => "on".to_string(),
            Crossfade::Seconds(s) => s.to_string(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Crossfade::Off),
            "on" => Some(Crossfade::On),
            other => other.parse().ok().map(Crossfade::Seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_state_round_trips() {
        for state in [
            ProducerState::Scheduled,
            ProducerState::Producing,
            ProducerState::Current,
            ProducerState::Archived,
        ] {
            assert_eq!(ProducerState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ProducerState::parse("playing"), None);
    }

    #[test]
    fn crossfade_parses_custom_seconds() {
        assert_eq!(Crossfade::parse("on"), Some(Crossfade::On));
        assert_eq!(Crossfade::parse("4"), Some(Crossfade::Seconds(4)));
        assert_eq!(Crossfade::parse("soft"), None);
    }

    #[test]
    fn producer_kind_params_are_tagged_json() {
        let kind = ProducerKind::Election {
            flavor: ElectionFlavor::Shortest,
            filter: CandidateFilter {
                max_length: Some(240),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"election\""));
        assert_eq!(serde_json::from_str::<ProducerKind>(&json).unwrap(), kind);

        let fixed: ProducerKind =
            serde_json::from_str(r#"{"type":"fixed_list","song_ids":[3,1]}"#).unwrap();
        assert_eq!(fixed, ProducerKind::FixedList { song_ids: vec![3, 1] });
    }
}
