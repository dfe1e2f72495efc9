//! Station workers: the advance loop, pause state and notifications.

pub mod advance;
pub mod notifier;
pub mod state;
pub mod worker;

pub use advance::{retry_on_conflict, AdvanceOutcome, PlaySource, RatingUpdate, StationScheduler};
pub use notifier::{log_notifications, NotificationKind, StationNotification, StationNotifier};
pub use state::StationStateStore;
pub use worker::{spawn_station, spawn_stations, StationCommand, StationHandle};

use crate::schedule::ScheduleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StationError {
    #[error("Worker for station {0} is gone")]
    WorkerGone(u32),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StationError::Schedule(e) if e.is_retryable())
    }
}
