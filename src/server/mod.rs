pub mod metrics;
mod requests_logging;
#[allow(clippy::module_inception)]
pub mod server;
pub mod state;

pub use requests_logging::{log_requests, RequestsLoggingLevel};
pub use server::{make_app, run_server};
pub use state::ServerState;
