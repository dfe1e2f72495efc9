//! Radio Scheduler Library
//!
//! Station scheduling and rotation fairness: cooldowns, ratings, election
//! blocks, producers and the per-station advance loop.

pub mod catalog;
pub mod config;
pub mod schedule;
pub mod server;
pub mod sqlite_persistence;
pub mod station;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{AppConfig, StationSettings};
pub use schedule::ScheduleError;
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerState};
pub use station::{spawn_station, StationHandle, StationNotifier, StationScheduler};
pub use storage::SqliteStorage;
