//! SQLite-backed [`FlatStore`](crate::storage::FlatStore).
//!
//! One table per record type: `profilers`, `timings`, `custom_timings` and
//! `client_timings`. Ids are stored as hyphenated UUID text and timestamps
//! as fixed-width RFC 3339 text.

mod connection;
mod flat_store;
mod helpers;
mod migrations;
mod repositories;

pub use connection::Database;
