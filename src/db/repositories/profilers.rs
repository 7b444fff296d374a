use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_uuid, parse_uuid, to_i64, to_u32},
};
use crate::storage::{ListOrder, ListQuery, SessionRecord, UpsertOutcome};

fn row_to_session(row: &Row) -> Result<SessionRecord> {
    let id: String = row.get("id")?;
    let started_at: String = row.get("started_at")?;
    let root_timing_id: Option<String> = row.get("root_timing_id")?;
    let redirect_count: Option<i64> = row.get("client_timings_redirect_count")?;

    Ok(SessionRecord {
        id: parse_uuid(&id, "id")?,
        name: row.get("name")?,
        started: parse_datetime(&started_at, "started_at")?,
        machine_name: row.get("machine_name")?,
        user: row.get("user_name")?,
        root_timing_id: parse_optional_uuid(root_timing_id, "root_timing_id")?,
        duration_ms: row.get("duration_ms")?,
        custom_links_json: row.get("custom_links_json")?,
        client_timings_redirect_count: redirect_count
            .map(|count| to_u32(count, "client_timings_redirect_count"))
            .transpose()?,
        has_user_viewed: row.get("has_user_viewed")?,
    })
}

fn collect_ids(rows: &mut rusqlite::Rows<'_>) -> Result<Vec<Uuid>> {
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        ids.push(parse_uuid(&id, "id")?);
    }
    Ok(ids)
}

impl Database {
    pub async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, started_at, machine_name, user_name, root_timing_id, duration_ms,
                        custom_links_json, client_timings_redirect_count, has_user_viewed
                 FROM profilers
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![id.to_string()])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    /// Replaces the session row with the same id, inserting it when absent.
    /// An existing row keeps its `root_timing_id`: the stored tree is write-once.
    pub async fn replace_session(&self, record: &SessionRecord) -> Result<UpsertOutcome> {
        let record = record.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let id = record.id.to_string();

            let exists = tx
                .query_row("SELECT 1 FROM profilers WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?
                .is_some();

            let started_at = format_datetime(&record.started);
            let root_timing_id = record.root_timing_id.map(|root| root.to_string());

            let outcome = if exists {
                tx.execute(
                    "UPDATE profilers
                     SET name = ?2,
                         started_at = ?3,
                         machine_name = ?4,
                         user_name = ?5,
                         duration_ms = ?6,
                         custom_links_json = ?7,
                         client_timings_redirect_count = COALESCE(?8, client_timings_redirect_count),
                         has_user_viewed = ?9
                     WHERE id = ?1",
                    params![
                        id,
                        record.name,
                        started_at,
                        record.machine_name,
                        record.user,
                        record.duration_ms,
                        record.custom_links_json,
                        record.client_timings_redirect_count,
                        record.has_user_viewed,
                    ],
                )
                .context("failed to replace session")?;
                UpsertOutcome::Replaced
            } else {
                tx.execute(
                    "INSERT INTO profilers (id, name, started_at, machine_name, user_name, root_timing_id,
                                            duration_ms, custom_links_json, client_timings_redirect_count,
                                            has_user_viewed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        id,
                        record.name,
                        started_at,
                        record.machine_name,
                        record.user,
                        root_timing_id,
                        record.duration_ms,
                        record.custom_links_json,
                        record.client_timings_redirect_count,
                        record.has_user_viewed,
                    ],
                )
                .context("failed to insert session")?;
                UpsertOutcome::Inserted
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    pub async fn set_session_viewed(&self, id: Uuid, viewed: bool) -> Result<bool> {
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE profilers SET has_user_viewed = ?1 WHERE id = ?2",
                    params![viewed, id.to_string()],
                )
                .context("failed to update has_user_viewed")?;
            Ok(rows_affected > 0)
        })
        .await
    }

    pub async fn find_unviewed_session_ids(&self, user: &str) -> Result<Vec<Uuid>> {
        let user = user.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM profilers
                 WHERE user_name = ?1 AND has_user_viewed = 0
                 ORDER BY started_at ASC, id ASC",
            )?;
            let mut rows = stmt.query(params![user])?;
            collect_ids(&mut rows)
        })
        .await
    }

    pub async fn find_session_ids(&self, query: &ListQuery) -> Result<Vec<Uuid>> {
        let query = query.clone();
        self.execute(move |conn| {
            let mut sql = String::from("SELECT id FROM profilers");
            let mut conditions = Vec::new();
            let mut values = Vec::new();

            if let Some(start) = query.start {
                values.push(Value::Text(format_datetime(&start)));
                conditions.push(format!("started_at > ?{}", values.len()));
            }
            if let Some(end) = query.end {
                values.push(Value::Text(format_datetime(&end)));
                conditions.push(format!("started_at < ?{}", values.len()));
            }
            if !conditions.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&conditions.join(" AND "));
            }

            let direction = match query.order {
                ListOrder::Ascending => "ASC",
                ListOrder::Descending => "DESC",
            };
            values.push(Value::Integer(to_i64(query.max_results)?));
            sql.push_str(&format!(
                " ORDER BY started_at {direction}, id {direction} LIMIT ?{}",
                values.len()
            ));

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(values))?;
            collect_ids(&mut rows)
        })
        .await
    }
}
