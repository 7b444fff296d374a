//! Flat record shapes stored per table, and the mapping to and from the
//! in-memory tree. Each record type has its own pair of functions so the
//! field-level rules stay visible in one place.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ClientTiming, CustomTiming, ExecuteType, Session, Timing};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub name: String,
    pub started: DateTime<Utc>,
    pub machine_name: String,
    pub user: Option<String>,
    pub root_timing_id: Option<Uuid>,
    pub duration_ms: f64,
    pub custom_links_json: Option<String>,
    pub client_timings_redirect_count: Option<u32>,
    pub has_user_viewed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub id: Uuid,
    pub parent_timing_id: Option<Uuid>,
    pub name: String,
    pub start_ms: f64,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomTimingRecord {
    pub id: Uuid,
    pub key: String,
    pub timing_id: Uuid,
    pub command_string: String,
    pub execute_type: String,
    pub stack_trace_snippet: Option<String>,
    pub start_ms: f64,
    pub duration_ms: Option<f64>,
    pub first_fetch_duration_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientTimingRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub start_ms: f64,
    pub duration_ms: f64,
}

pub fn session_to_record(session: &Session) -> SessionRecord {
    SessionRecord {
        id: session.id,
        name: session.name.clone(),
        started: session.started,
        machine_name: session.machine_name.clone(),
        user: session.user.clone(),
        root_timing_id: session.root.as_ref().map(|root| root.id),
        duration_ms: session.duration_ms,
        custom_links_json: session.custom_links_json.clone(),
        client_timings_redirect_count: session
            .client_timings
            .as_ref()
            .map(|client| client.redirect_count),
        has_user_viewed: session.has_user_viewed,
    }
}

/// The returned session has no root timing and no client timings attached yet.
pub fn record_to_session(record: SessionRecord) -> Session {
    Session {
        id: record.id,
        name: record.name,
        started: record.started,
        duration_ms: record.duration_ms,
        user: record.user,
        has_user_viewed: record.has_user_viewed,
        machine_name: record.machine_name,
        custom_links_json: record.custom_links_json,
        root: None,
        client_timings: None,
    }
}

pub fn timing_to_record(timing: &Timing, parent_timing_id: Option<Uuid>) -> TimingRecord {
    TimingRecord {
        id: timing.id,
        parent_timing_id,
        name: timing.name.clone(),
        start_ms: timing.start_ms,
        duration_ms: timing.duration_ms,
    }
}

pub fn record_to_timing(record: TimingRecord) -> Timing {
    Timing {
        id: record.id,
        name: record.name,
        start_ms: record.start_ms,
        duration_ms: record.duration_ms,
        children: Vec::new(),
        custom_timings: Default::default(),
    }
}

pub fn custom_timing_to_record(
    custom: &CustomTiming,
    timing_id: Uuid,
    key: &str,
) -> CustomTimingRecord {
    CustomTimingRecord {
        id: custom.id,
        key: key.to_string(),
        timing_id,
        command_string: custom.command_string.clone(),
        execute_type: custom.execute_type.as_str().to_string(),
        stack_trace_snippet: custom.stack_trace_snippet.clone(),
        start_ms: custom.start_ms,
        duration_ms: custom.duration_ms,
        first_fetch_duration_ms: custom.first_fetch_duration_ms,
    }
}

/// Returns the group key alongside the timing.
pub fn record_to_custom_timing(record: CustomTimingRecord) -> Result<(String, CustomTiming)> {
    let execute_type = ExecuteType::parse(&record.execute_type)
        .with_context(|| format!("custom timing {} has an invalid execute_type", record.id))?;

    Ok((
        record.key,
        CustomTiming {
            id: record.id,
            command_string: record.command_string,
            execute_type,
            stack_trace_snippet: record.stack_trace_snippet,
            start_ms: record.start_ms,
            duration_ms: record.duration_ms,
            first_fetch_duration_ms: record.first_fetch_duration_ms,
        },
    ))
}

pub fn client_timing_to_record(
    timing: &ClientTiming,
    id: Uuid,
    session_id: Uuid,
) -> ClientTimingRecord {
    ClientTimingRecord {
        id,
        session_id,
        name: timing.name.clone(),
        start_ms: timing.start_ms,
        duration_ms: timing.duration_ms,
    }
}

pub fn record_to_client_timing(record: ClientTimingRecord) -> ClientTiming {
    ClientTiming {
        id: Some(record.id),
        session_id: Some(record.session_id),
        name: record.name,
        start_ms: record.start_ms,
        duration_ms: record.duration_ms,
    }
}
