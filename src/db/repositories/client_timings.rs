use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{connection::Database, helpers::parse_uuid};
use crate::storage::{ClientTimingRecord, UpsertOutcome};

fn row_to_client_timing(row: &Row) -> Result<ClientTimingRecord> {
    let id: String = row.get("id")?;
    let session_id: String = row.get("session_id")?;

    Ok(ClientTimingRecord {
        id: parse_uuid(&id, "id")?,
        session_id: parse_uuid(&session_id, "session_id")?,
        name: row.get("name")?,
        start_ms: row.get("start_ms")?,
        duration_ms: row.get("duration_ms")?,
    })
}

impl Database {
    pub async fn find_client_timings(&self, session_id: Uuid) -> Result<Vec<ClientTimingRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, name, start_ms, duration_ms
                 FROM client_timings
                 WHERE session_id = ?1",
            )?;

            let mut rows = stmt.query(params![session_id.to_string()])?;
            let mut timings = Vec::new();
            while let Some(row) = rows.next()? {
                timings.push(row_to_client_timing(row)?);
            }

            Ok(timings)
        })
        .await
    }

    pub async fn replace_client_timing(&self, record: &ClientTimingRecord) -> Result<UpsertOutcome> {
        let record = record.clone();
        self.execute(move |conn| {
            let id = record.id.to_string();
            let existed = conn
                .query_row(
                    "SELECT 1 FROM client_timings WHERE id = ?1",
                    params![id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();

            conn.execute(
                "INSERT INTO client_timings (id, session_id, name, start_ms, duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     session_id = excluded.session_id,
                     name = excluded.name,
                     start_ms = excluded.start_ms,
                     duration_ms = excluded.duration_ms",
                params![
                    id,
                    record.session_id.to_string(),
                    record.name,
                    record.start_ms,
                    record.duration_ms,
                ],
            )
            .with_context(|| format!("failed to upsert client timing {id}"))?;

            Ok(if existed {
                UpsertOutcome::Replaced
            } else {
                UpsertOutcome::Inserted
            })
        })
        .await
    }

    /// Deletes the session's client timings whose id is not in `keep`. The ids
    /// travel as one JSON array so the statement has two parameters at any size.
    pub async fn delete_client_timings_except(
        &self,
        session_id: Uuid,
        keep: &[Uuid],
    ) -> Result<usize> {
        let keep = serde_json::to_string(keep).context("failed to encode kept client timing ids")?;

        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM client_timings
                     WHERE session_id = ?1
                       AND id NOT IN (SELECT value FROM json_each(?2))",
                    params![session_id.to_string(), keep],
                )
                .context("failed to prune client timings")?;
            Ok(removed)
        })
        .await
    }
}
