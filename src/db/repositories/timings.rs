use anyhow::{Context, Result};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_optional_uuid, parse_uuid},
};
use crate::storage::TimingRecord;

fn row_to_timing(row: &Row) -> Result<TimingRecord> {
    let id: String = row.get("id")?;
    let parent_timing_id: Option<String> = row.get("parent_timing_id")?;

    Ok(TimingRecord {
        id: parse_uuid(&id, "id")?,
        parent_timing_id: parse_optional_uuid(parent_timing_id, "parent_timing_id")?,
        name: row.get("name")?,
        start_ms: row.get("start_ms")?,
        duration_ms: row.get("duration_ms")?,
    })
}

impl Database {
    pub async fn find_timing(&self, id: Uuid) -> Result<Option<TimingRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, parent_timing_id, name, start_ms, duration_ms
                 FROM timings
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![id.to_string()])?;
            let timing = match rows.next()? {
                Some(row) => Some(row_to_timing(row)?),
                None => None,
            };
            Ok(timing)
        })
        .await
    }

    /// Load the direct children of a timing, ordered by start offset.
    pub async fn find_child_timings(&self, parent_id: Uuid) -> Result<Vec<TimingRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, parent_timing_id, name, start_ms, duration_ms
                 FROM timings
                 WHERE parent_timing_id = ?1
                 ORDER BY start_ms ASC",
            )?;

            let mut rows = stmt.query(params![parent_id.to_string()])?;
            let mut timings = Vec::new();
            while let Some(row) = rows.next()? {
                timings.push(row_to_timing(row)?);
            }

            Ok(timings)
        })
        .await
    }

    pub async fn insert_timing(&self, record: &TimingRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO timings (id, parent_timing_id, name, start_ms, duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id.to_string(),
                    record.parent_timing_id.map(|parent| parent.to_string()),
                    record.name,
                    record.start_ms,
                    record.duration_ms,
                ],
            )
            .with_context(|| format!("failed to insert timing {}", record.id))?;
            Ok(())
        })
        .await
    }
}
