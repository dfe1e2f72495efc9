//! Encoder annotation strings.
//!
//! `annotate:crossfade="1",use_suffix="1",suffix="mp3",replay_gain="-3.2":/a.mp3`
//!
//! `crossfade` and `use_suffix` are always present; the suffix or title and
//! the replay gain are left out entirely when not set.

use super::models::Crossfade;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationLabel {
    Suffix(String),
    Title(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub crossfade: Crossfade,
    pub use_suffix: bool,
    pub label: Option<AnnotationLabel>,
    pub replay_gain: Option<String>,
    pub filename: String,
}

fn quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let crossfade = match self.crossfade {
            Crossfade::Off => "0".to_string(),
            Crossfade::On => "1".to_string(),
            Crossfade::Seconds(s) => s.to_string(),
        };
        write!(
            f,
            "annotate:crossfade=\"{}\",use_suffix=\"{}\"",
            crossfade,
            if self.use_suffix { "1" } else { "0" }
        )?;
        match &self.label {
            Some(AnnotationLabel::Suffix(suffix)) => write!(f, ",suffix=\"{}\"", quoted(suffix))?,
            Some(AnnotationLabel::Title(title)) => write!(f, ",title=\"{}\"", quoted(title))?,
            None => {}
        }
        if let Some(gain) = &self.replay_gain {
            write!(f, ",replay_gain=\"{}\"", quoted(gain))?;
        }
        write!(f, ":{}", self.filename)
    }
}

/// Annotation played while a station is paused.
pub fn pause_annotation(pause_file: &str, title: &str) -> Annotation {
    Annotation {
        crossfade: Crossfade::Seconds(2),
        use_suffix: true,
        label: Some(AnnotationLabel::Title(title.to_string())),
        replay_gain: None,
        filename: pause_file.to_string(),
    }
}
