use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The candidate pool for a station came up empty.
    #[error("No eligible candidates for station {sid}")]
    NoEligibleCandidates { sid: u32 },

    /// SQLite reported the database busy or locked.
    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    #[error("Invalid producer state: {0}")]
    InvalidProducerState(String),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl ScheduleError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        ScheduleError::InvalidProducerState(msg.into())
    }

    /// Whether the caller should retry the same request shortly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScheduleError::StorageConflict(_))
    }

    /// Whether the station worker must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScheduleError::InvalidProducerState(_))
    }
}

pub fn is_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

impl From<rusqlite::Error> for ScheduleError {
    fn from(err: rusqlite::Error) -> Self {
        if is_conflict(&err) {
            ScheduleError::StorageConflict(err.to_string())
        } else {
            ScheduleError::Storage(err.into())
        }
    }
}

impl From<anyhow::Error> for ScheduleError {
    fn from(err: anyhow::Error) -> Self {
        let conflict = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<rusqlite::Error>())
            .any(is_conflict);
        if conflict {
            ScheduleError::StorageConflict(format!("{:#}", err))
        } else {
            ScheduleError::Storage(err)
        }
    }
}
