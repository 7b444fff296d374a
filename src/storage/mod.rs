//! Persistence of profiling sessions over a flat record store.
//!
//! `ProfileStorage` turns a [`Session`](crate::models::Session) tree into session, timing,
//! custom-timing and client-timing records and back. The store itself only
//! has to answer equality lookups and report whether an upsert replaced an
//! existing row.

use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::{log_info, log_warn};

mod loader;
pub mod records;
mod writer;

pub use records::{ClientTimingRecord, CustomTimingRecord, SessionRecord, TimingRecord};

const ENABLE_LOGS: bool = true;

/// Result of a replace-by-id write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
    Ascending,
    #[default]
    Descending,
}

/// Session listing filter. Bounds are exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub max_results: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub order: ListOrder,
}

/// Record-level access the profiling store needs from its backend.
#[async_trait]
pub trait FlatStore: Send + Sync {
    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>>;
    /// Upserts by id. When a row already exists its `root_timing_id` must be
    /// left as stored, since the timing tree it points at is never rewritten.
    /// A `None` redirect count also keeps the stored one.
    async fn replace_session(&self, record: &SessionRecord) -> Result<UpsertOutcome>;
    /// Returns false when no session row has this id.
    async fn set_session_viewed(&self, id: Uuid, viewed: bool) -> Result<bool>;
    async fn find_unviewed_session_ids(&self, user: &str) -> Result<Vec<Uuid>>;
    async fn find_session_ids(&self, query: &ListQuery) -> Result<Vec<Uuid>>;

    async fn find_timing(&self, id: Uuid) -> Result<Option<TimingRecord>>;
    /// Children of `parent_id`, ascending by start offset.
    async fn find_child_timings(&self, parent_id: Uuid) -> Result<Vec<TimingRecord>>;
    async fn insert_timing(&self, record: &TimingRecord) -> Result<()>;

    async fn find_custom_timings(&self, timing_id: Uuid) -> Result<Vec<CustomTimingRecord>>;
    async fn insert_custom_timing(&self, record: &CustomTimingRecord) -> Result<()>;

    async fn find_client_timings(&self, session_id: Uuid) -> Result<Vec<ClientTimingRecord>>;
    async fn replace_client_timing(&self, record: &ClientTimingRecord) -> Result<UpsertOutcome>;
    /// Removes client timings of `session_id` whose id is not in `keep`.
    async fn delete_client_timings_except(&self, session_id: Uuid, keep: &[Uuid]) -> Result<usize>;
}

/// Saves and loads profiling sessions through a [`FlatStore`].
#[derive(Clone)]
pub struct ProfileStorage<S> {
    store: S,
}

impl<S: FlatStore> ProfileStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn mark_viewed(&self, user: &str, id: Uuid) -> StorageResult<()> {
        self.set_viewed(user, id, true).await
    }

    pub async fn mark_unviewed(&self, user: &str, id: Uuid) -> StorageResult<()> {
        self.set_viewed(user, id, false).await
    }

    async fn set_viewed(&self, user: &str, id: Uuid, viewed: bool) -> StorageResult<()> {
        let matched = self.store.set_session_viewed(id, viewed).await?;
        if matched {
            log_info!("Session {id} marked viewed={viewed} for {user}");
        } else {
            log_warn!("Cannot mark session {id} viewed={viewed} for {user}: no such session");
        }
        Ok(())
    }

    /// Ids of `user`'s sessions not yet viewed, oldest first.
    pub async fn list_unviewed_ids(&self, user: &str) -> StorageResult<Vec<Uuid>> {
        Ok(self.store.find_unviewed_session_ids(user).await?)
    }

    pub async fn list_ids(
        &self,
        max_results: usize,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        order: ListOrder,
    ) -> StorageResult<Vec<Uuid>> {
        let query = ListQuery {
            max_results,
            start,
            end,
            order,
        };
        Ok(self.store.find_session_ids(&query).await?)
    }
}

/// Runs one storage call, giving up with `Cancelled` as soon as `cancel` fires.
async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> StorageResult<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = call => result.map_err(StorageError::Backend),
    }
}
