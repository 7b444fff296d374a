//! Storage for request profiling sessions.
//!
//! A [`Session`] owns a tree of [`Timing`]s, each carrying keyed
//! [`CustomTiming`]s, plus a flat list of browser-reported client timings.
//! [`ProfileStorage`] saves that tree into four flat tables and rebuilds it
//! on load; [`Database`] is the SQLite backend.

pub mod command;
pub mod config;
mod db;
pub mod error;
pub mod models;
pub mod recorder;
pub mod storage;
mod utils;

pub use command::Operation;
pub use config::{SettingsStore, StoreSettings};
pub use db::Database;
pub use error::{StorageError, StorageResult};
pub use models::{ClientTiming, ClientTimings, CustomTiming, ExecuteType, Session, Timing};
pub use recorder::Recorder;
pub use storage::{FlatStore, ListOrder, ListQuery, ProfileStorage, UpsertOutcome};
pub use utils::logging::init_logging;

/// Opens the SQLite database named by `settings` and wraps it for profiling storage.
pub fn open_storage(settings: &StoreSettings) -> anyhow::Result<ProfileStorage<Database>> {
    let database = Database::from_settings(settings)?;
    Ok(ProfileStorage::new(database))
}
