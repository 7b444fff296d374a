use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::connection::Database;
use crate::storage::{
    ClientTimingRecord, CustomTimingRecord, FlatStore, ListQuery, SessionRecord, TimingRecord,
    UpsertOutcome,
};

#[async_trait]
impl FlatStore for Database {
    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        Database::find_session(self, id).await
    }

    async fn replace_session(&self, record: &SessionRecord) -> Result<UpsertOutcome> {
        Database::replace_session(self, record).await
    }

    async fn set_session_viewed(&self, id: Uuid, viewed: bool) -> Result<bool> {
        Database::set_session_viewed(self, id, viewed).await
    }

    async fn find_unviewed_session_ids(&self, user: &str) -> Result<Vec<Uuid>> {
        Database::find_unviewed_session_ids(self, user).await
    }

    async fn find_session_ids(&self, query: &ListQuery) -> Result<Vec<Uuid>> {
        Database::find_session_ids(self, query).await
    }

    async fn find_timing(&self, id: Uuid) -> Result<Option<TimingRecord>> {
        Database::find_timing(self, id).await
    }

    async fn find_child_timings(&self, parent_id: Uuid) -> Result<Vec<TimingRecord>> {
        Database::find_child_timings(self, parent_id).await
    }

    async fn insert_timing(&self, record: &TimingRecord) -> Result<()> {
        Database::insert_timing(self, record).await
    }

    async fn find_custom_timings(&self, timing_id: Uuid) -> Result<Vec<CustomTimingRecord>> {
        Database::find_custom_timings(self, timing_id).await
    }

    async fn insert_custom_timing(&self, record: &CustomTimingRecord) -> Result<()> {
        Database::insert_custom_timing(self, record).await
    }

    async fn find_client_timings(&self, session_id: Uuid) -> Result<Vec<ClientTimingRecord>> {
        Database::find_client_timings(self, session_id).await
    }

    async fn replace_client_timing(&self, record: &ClientTimingRecord) -> Result<UpsertOutcome> {
        Database::replace_client_timing(self, record).await
    }

    async fn delete_client_timings_except(&self, session_id: Uuid, keep: &[Uuid]) -> Result<usize> {
        Database::delete_client_timings_except(self, session_id, keep).await
    }
}
