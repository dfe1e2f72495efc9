mod file_config;

pub use file_config::{FileConfig, StationFileConfig};

use crate::catalog::cooldown::AgeCurve;
use crate::catalog::CooldownConfig;
use crate::schedule::ElectionFlavor;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PAUSE_TITLE: &str = "Intermission";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub annotations: bool,
    pub pause_file: Option<String>,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub busy_timeout: Duration,
    pub stations: Vec<StationSettings>,
}

/// Everything a station worker needs to know about its station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationSettings {
    pub sid: u32,
    pub name: String,
    pub stream_suffix: Option<String>,
    pub cooldown: CooldownConfig,
    pub songs_per_election: usize,
    /// Elections a losing song sits out.
    pub election_block: u32,
    pub default_flavor: ElectionFlavor,
    pub annotations: bool,
    pub pause_file: String,
    pub pause_title: String,
}

impl StationSettings {
    pub fn new(sid: u32, pause_file: impl Into<String>) -> Self {
        Self {
            sid,
            name: format!("Station {}", sid),
            stream_suffix: None,
            cooldown: CooldownConfig::default(),
            songs_per_election: 3,
            election_block: 2,
            default_flavor: ElectionFlavor::General,
            annotations: false,
            pause_file: pause_file.into(),
            pause_title: DEFAULT_PAUSE_TITLE.to_string(),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let busy_timeout = Duration::from_millis(file.busy_timeout_ms.unwrap_or(cli.busy_timeout_ms));

        let annotations = file.annotations.unwrap_or(cli.annotations);
        let pause_file = file
            .pause_file
            .or_else(|| cli.pause_file.clone())
            .unwrap_or_else(|| "pause.mp3".to_string());
        let rating_threshold = file.rating_threshold.unwrap_or(10);

        if file.stations.is_empty() {
            bail!("At least one [[stations]] entry is required");
        }

        let mut seen = HashSet::new();
        let mut stations = Vec::with_capacity(file.stations.len());
        for station in file.stations {
            let settings =
                resolve_station(station, annotations, &pause_file, rating_threshold)?;
            if !seen.insert(settings.sid) {
                bail!("Station {} is configured twice", settings.sid);
            }
            stations.push(settings);
        }

        Ok(Self {
            db_path,
            port,
            logging_level,
            busy_timeout,
            stations,
        })
    }
}

fn resolve_station(
    file: StationFileConfig,
    annotations: bool,
    pause_file: &str,
    rating_threshold: u32,
) -> Result<StationSettings> {
    let Some(sid) = file.sid else {
        bail!("Every [[stations]] entry needs a sid");
    };
    let mut settings = StationSettings::new(sid, pause_file);
    let defaults = CooldownConfig::default();
    let age_defaults = AgeCurve::default();

    settings.cooldown = CooldownConfig {
        min_song_cool: file.min_song_cool.unwrap_or(defaults.min_song_cool),
        max_song_cool: file.max_song_cool.unwrap_or(defaults.max_song_cool),
        min_album_cool: file.min_album_cool.unwrap_or(defaults.min_album_cool),
        max_album_cool: file.max_album_cool.unwrap_or(defaults.max_album_cool),
        base_rating: file.base_rating.unwrap_or(defaults.base_rating),
        rating_threshold,
        request_only_period: file
            .request_only_period
            .unwrap_or(defaults.request_only_period),
        age: AgeCurve {
            grace_days: file.age_grace_days.unwrap_or(age_defaults.grace_days),
            floor_days: file.age_floor_days.unwrap_or(age_defaults.floor_days),
            floor_multiplier: file
                .age_floor_multiplier
                .unwrap_or(age_defaults.floor_multiplier),
        },
    };
    validate_cooldown(sid, &settings.cooldown)?;

    if let Some(name) = file.name {
        settings.name = name;
    }
    settings.stream_suffix = file.stream_suffix.filter(|s| !s.is_empty());
    settings.songs_per_election = file.songs_per_election.unwrap_or(settings.songs_per_election);
    if settings.songs_per_election == 0 {
        bail!("Station {}: songs_per_election must be at least 1", sid);
    }
    settings.election_block = file.election_block.unwrap_or(settings.election_block);
    settings.default_flavor = file.default_flavor.unwrap_or(settings.default_flavor);
    settings.annotations = annotations;
    if let Some(title) = file.pause_title {
        settings.pause_title = title;
    }
    Ok(settings)
}

fn validate_cooldown(sid: u32, config: &CooldownConfig) -> Result<()> {
    if config.min_song_cool < 0 || config.min_album_cool < 0 || config.request_only_period < 0 {
        bail!("Station {}: cooldowns cannot be negative", sid);
    }
    if config.min_song_cool > config.max_song_cool {
        bail!(
            "Station {}: min_song_cool ({}) exceeds max_song_cool ({})",
            sid,
            config.min_song_cool,
            config.max_song_cool
        );
    }
    if config.min_album_cool > config.max_album_cool {
        bail!(
            "Station {}: min_album_cool ({}) exceeds max_album_cool ({})",
            sid,
            config.min_album_cool,
            config.max_album_cool
        );
    }
    if !(1.0..=5.0).contains(&config.base_rating) {
        bail!("Station {}: base_rating must be within 1..=5", sid);
    }
    let age = &config.age;
    if !(age.floor_multiplier > 0.0 && age.floor_multiplier <= 1.0) {
        bail!("Station {}: age_floor_multiplier must be within (0, 1]", sid);
    }
    if age.grace_days < 0.0 || age.floor_days < age.grace_days {
        bail!("Station {}: age_floor_days must not precede age_grace_days", sid);
    }
    Ok(())
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_path: Some(dir.path().join("radio.db")),
            port: 10000,
            logging_level: RequestsLoggingLevel::Path,
            annotations: false,
            pause_file: Some("/cli/pause.mp3".to_string()),
            busy_timeout_ms: 250,
        }
    }

    fn one_station() -> FileConfig {
        FileConfig {
            stations: vec![StationFileConfig {
                sid: Some(1),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("HEADERS"),
            Some(RequestsLoggingLevel::Headers)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli(&dir), Some(one_station())).unwrap();

        assert_eq!(config.port, 10000);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        let station = &config.stations[0];
        assert_eq!(station.sid, 1);
        assert_eq!(station.name, "Station 1");
        assert_eq!(station.songs_per_election, 3);
        assert_eq!(station.election_block, 2);
        assert_eq!(station.pause_file, "/cli/pause.mp3");
        assert_eq!(station.pause_title, DEFAULT_PAUSE_TITLE);
        assert_eq!(station.cooldown, CooldownConfig::default());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let dir = TempDir::new().unwrap();
        let mut file = one_station();
        file.port = Some(4000);
        file.annotations = Some(true);
        file.pause_file = Some("/toml/pause.mp3".to_string());
        file.logging_level = Some("none".to_string());
        file.rating_threshold = Some(3);
        file.stations[0].min_song_cool = Some(100);
        file.stations[0].default_flavor = Some(ElectionFlavor::Shortest);

        let config = AppConfig::resolve(&cli(&dir), Some(file)).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::None);
        let station = &config.stations[0];
        assert!(station.annotations);
        assert_eq!(station.pause_file, "/toml/pause.mp3");
        assert_eq!(station.cooldown.min_song_cool, 100);
        assert_eq!(station.cooldown.rating_threshold, 3);
        assert_eq!(station.default_flavor, ElectionFlavor::Shortest);
    }

    #[test]
    fn test_resolve_missing_db_path_error() {
        let result = AppConfig::resolve(&CliConfig::default(), Some(one_station()));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_path must be specified"));
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/nonexistent/path/radio.db")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, Some(one_station()));
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_requires_stations() {
        let dir = TempDir::new().unwrap();
        let result = AppConfig::resolve(&cli(&dir), None);
        assert!(result.unwrap_err().to_string().contains("[[stations]]"));
    }

    #[test]
    fn test_resolve_rejects_duplicate_station() {
        let dir = TempDir::new().unwrap();
        let mut file = one_station();
        file.stations.push(file.stations[0].clone());
        let result = AppConfig::resolve(&cli(&dir), Some(file));
        assert!(result.unwrap_err().to_string().contains("configured twice"));
    }

    #[test]
    fn test_resolve_rejects_bad_cooldowns() {
        let dir = TempDir::new().unwrap();

        let mut inverted = one_station();
        inverted.stations[0].min_song_cool = Some(5000);
        let err = AppConfig::resolve(&cli(&dir), Some(inverted)).unwrap_err();
        assert!(err.to_string().contains("exceeds max_song_cool"));

        let mut rating = one_station();
        rating.stations[0].base_rating = Some(7.0);
        assert!(AppConfig::resolve(&cli(&dir), Some(rating)).is_err());

        let mut empty = one_station();
        empty.stations[0].songs_per_election = Some(0);
        assert!(AppConfig::resolve(&cli(&dir), Some(empty)).is_err());
    }
}
