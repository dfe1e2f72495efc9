//! Common test infrastructure
//!
//! Each test spawns its own server over a fresh station database.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, STATION_ID};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_advance() {
//!     let server = TestServer::spawn().await;
//!
//!     let response = server.advance(STATION_ID).await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

mod constants;
mod fixtures;
mod server;

pub use constants::*;
pub use server::TestServer;

#[allow(unused_imports)]
pub use fixtures::{insert_song, insert_user_rating, song_column};
