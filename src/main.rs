use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use radio_scheduler::catalog::{CatalogSnapshot, SnapshotCache, SqliteCatalogStore};
use radio_scheduler::config::{AppConfig, CliConfig, FileConfig};
use radio_scheduler::server::{metrics, run_server, RequestsLoggingLevel};
use radio_scheduler::station::{log_notifications, spawn_stations, StationNotifier};
use radio_scheduler::storage::SqliteStorage;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite station database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 10000)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Return annotated references instead of bare filenames.
    #[clap(long)]
    pub annotations: bool,

    /// File played while a station is paused or has nothing to play.
    #[clap(long)]
    pub pause_file: Option<String>,

    /// How long to wait on a busy database before giving up, in milliseconds.
    #[clap(long, default_value_t = 250)]
    pub busy_timeout_ms: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            annotations: self.annotations,
            pause_file: self.pause_file.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

fn load_snapshot(storage: &SqliteStorage) -> Result<CatalogSnapshot> {
    let store = SqliteCatalogStore::new(storage.connection());
    CatalogSnapshot::load(&store, chrono::Utc::now().timestamp())
}

#[cfg(unix)]
async fn refresh_snapshot_on_hup(
    config: AppConfig,
    cache: Arc<SnapshotCache>,
    shutdown: CancellationToken,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    let sids: Vec<u32> = config.stations.iter().map(|s| s.sid).collect();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = hangups.recv() => {}
        }
        info!("SIGHUP received, refreshing catalog snapshot");
        let db_path = config.db_path.clone();
        let busy_timeout = config.busy_timeout;
        let loaded = tokio::task::spawn_blocking(move || {
            let storage = SqliteStorage::open(&db_path, busy_timeout)?;
            load_snapshot(&storage)
        })
        .await?;
        match loaded {
            Ok(snapshot) => {
                metrics::set_catalog_metrics(&snapshot, &sids);
                cache.replace(snapshot);
            }
            Err(e) => error!("Failed to refresh catalog snapshot: {:#}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    info!(
        "Starting radio backend {} with {} stations",
        env!("GIT_HASH"),
        config.stations.len()
    );

    info!("Opening SQLite database at {:?}...", config.db_path);
    let snapshot = {
        let storage = SqliteStorage::open(&config.db_path, config.busy_timeout)?;
        load_snapshot(&storage)?
    };

    info!("Initializing metrics...");
    metrics::init_metrics();
    let sids: Vec<u32> = config.stations.iter().map(|s| s.sid).collect();
    metrics::set_catalog_metrics(&snapshot, &sids);
    let cache = Arc::new(SnapshotCache::new(snapshot));

    let notifier = StationNotifier::default();
    tokio::spawn(log_notifications(notifier.subscribe()));

    let (handles, threads): (Vec<_>, Vec<_>) = spawn_stations(
        &config.stations,
        &config.db_path,
        config.busy_timeout,
        cache.clone(),
        &notifier,
    )?
    .into_iter()
    .unzip();

    let shutdown = CancellationToken::new();
    #[cfg(unix)]
    {
        let (config, cache, shutdown) = (config.clone(), cache.clone(), shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = refresh_snapshot_on_hup(config, cache, shutdown).await {
                error!("Snapshot refresh task failed: {:#}", e);
            }
        });
    }
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
            }
            shutdown.cancel();
        });
    }

    info!("Ready to serve at port {}!", config.port);
    let served = run_server(
        handles.clone(),
        config.logging_level.clone(),
        config.port,
        shutdown.clone(),
    )
    .await;
    shutdown.cancel();

    for handle in &handles {
        handle.shutdown().await;
    }
    let panicked = tokio::task::spawn_blocking(move || {
        threads
            .into_iter()
            .map(|thread| thread.join())
            .filter(Result::is_err)
            .count()
    })
    .await?;
    if panicked > 0 {
        error!("{} station workers panicked", panicked);
    }
    served
}
