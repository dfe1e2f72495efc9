use super::RequestsLoggingLevel;
use crate::station::StationHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub type GuardedStations = Arc<HashMap<u32, StationHandle>>;

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub stations: GuardedStations,
    pub logging_level: RequestsLoggingLevel,
    pub hash: String,
}

impl ServerState {
    pub fn new(
        stations: impl IntoIterator<Item = StationHandle>,
        logging_level: RequestsLoggingLevel,
    ) -> Self {
        let stations = stations.into_iter().map(|h| (h.sid(), h)).collect();
        ServerState {
            start_time: Instant::now(),
            stations: Arc::new(stations),
            logging_level,
            hash: env!("GIT_HASH").to_string(),
        }
    }

    pub fn station(&self, sid: u32) -> Option<&StationHandle> {
        self.stations.get(&sid)
    }
}
