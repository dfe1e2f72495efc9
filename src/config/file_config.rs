use crate::schedule::ElectionFlavor;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub annotations: Option<bool>,
    pub pause_file: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub rating_threshold: Option<u32>,

    pub stations: Vec<StationFileConfig>,
}

/// One `[[stations]]` table.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StationFileConfig {
    pub sid: Option<u32>,
    pub name: Option<String>,
    /// Stream format shown as the annotation suffix, e.g. "mp3".
    pub stream_suffix: Option<String>,

    // Cooldown bounds, in seconds
    pub min_song_cool: Option<i64>,
    pub max_song_cool: Option<i64>,
    pub min_album_cool: Option<i64>,
    pub max_album_cool: Option<i64>,
    pub base_rating: Option<f64>,
    pub request_only_period: Option<i64>,

    // Age curve
    pub age_grace_days: Option<f64>,
    pub age_floor_days: Option<f64>,
    pub age_floor_multiplier: Option<f64>,

    // Elections
    pub songs_per_election: Option<usize>,
    pub election_block: Option<u32>,
    pub default_flavor: Option<ElectionFlavor>,

    pub pause_title: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
