use anyhow::{Context, Result};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{connection::Database, helpers::parse_uuid};
use crate::storage::CustomTimingRecord;

fn row_to_custom_timing(row: &Row) -> Result<CustomTimingRecord> {
    let id: String = row.get("id")?;
    let timing_id: String = row.get("timing_id")?;

    Ok(CustomTimingRecord {
        id: parse_uuid(&id, "id")?,
        key: row.get("timing_key")?,
        timing_id: parse_uuid(&timing_id, "timing_id")?,
        command_string: row.get("command_string")?,
        execute_type: row.get("execute_type")?,
        stack_trace_snippet: row.get("stack_trace_snippet")?,
        start_ms: row.get("start_ms")?,
        duration_ms: row.get("duration_ms")?,
        first_fetch_duration_ms: row.get("first_fetch_duration_ms")?,
    })
}

impl Database {
    pub async fn find_custom_timings(&self, timing_id: Uuid) -> Result<Vec<CustomTimingRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timing_key, timing_id, command_string, execute_type, stack_trace_snippet,
                        start_ms, duration_ms, first_fetch_duration_ms
                 FROM custom_timings
                 WHERE timing_id = ?1",
            )?;

            let mut rows = stmt.query(params![timing_id.to_string()])?;
            let mut custom_timings = Vec::new();
            while let Some(row) = rows.next()? {
                custom_timings.push(row_to_custom_timing(row)?);
            }

            Ok(custom_timings)
        })
        .await
    }

    pub async fn insert_custom_timing(&self, record: &CustomTimingRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO custom_timings (
                    id,
                    timing_key,
                    timing_id,
                    command_string,
                    execute_type,
                    stack_trace_snippet,
                    start_ms,
                    duration_ms,
                    first_fetch_duration_ms
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.to_string(),
                    record.key,
                    record.timing_id.to_string(),
                    record.command_string,
                    record.execute_type,
                    record.stack_trace_snippet,
                    record.start_ms,
                    record.duration_ms,
                    record.first_fetch_duration_ms,
                ],
            )
            .with_context(|| format!("failed to insert custom timing {}", record.id))?;
            Ok(())
        })
        .await
    }
}
