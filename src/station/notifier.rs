//! Fire-and-forget station notifications.
//!
//! Delivery is at most once: a notification sent while nobody listens, or
//! missed by a lagging receiver, is simply gone.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    PauseEntered,
    PauseLeft,
    ScheduleAdvanced,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PauseEntered => "pause_entered",
            NotificationKind::PauseLeft => "pause_left",
            NotificationKind::ScheduleAdvanced => "schedule_advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationNotification {
    pub sid: u32,
    pub kind: NotificationKind,
}

#[derive(Clone)]
pub struct StationNotifier {
    sender: broadcast::Sender<StationNotification>,
}

impl StationNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationNotification> {
        self.sender.subscribe()
    }

    pub fn notify(&self, sid: u32, kind: NotificationKind) {
        if self.sender.send(StationNotification { sid, kind }).is_err() {
            trace!("No listeners for {} on station {}", kind.as_str(), sid);
        }
    }
}

impl Default for StationNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Logs notifications until every sender is gone. A lagging receiver skips
/// what it missed and keeps going. Returns how many were logged.
pub async fn log_notifications(mut receiver: broadcast::Receiver<StationNotification>) -> usize {
    let mut logged = 0;
    loop {
        match receiver.recv().await {
            Ok(notification) => {
                info!(
                    "Station {}: {}",
                    notification.sid,
                    notification.kind.as_str()
                );
                logged += 1;
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Notification log fell behind, {} notifications dropped", missed);
            }
            Err(RecvError::Closed) => return logged,
        }
    }
}
