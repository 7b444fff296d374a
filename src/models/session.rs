use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Timing;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientTiming {
    pub id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub name: String,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl ClientTiming {
    pub fn new(name: impl Into<String>, start_ms: f64, duration_ms: f64) -> Self {
        Self {
            id: None,
            session_id: None,
            name: name.into(),
            start_ms,
            duration_ms,
        }
    }
}

/// Browser-reported timings attached to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientTimings {
    pub redirect_count: u32,
    pub timings: Vec<ClientTiming>,
}

/// One complete profiling run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub started: DateTime<Utc>,
    pub duration_ms: f64,
    pub user: Option<String>,
    pub has_user_viewed: bool,
    pub machine_name: String,
    pub custom_links_json: Option<String>,
    pub root: Option<Timing>,
    pub client_timings: Option<ClientTimings>,
}

impl Session {
    pub fn new(name: impl Into<String>, machine_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            started: Utc::now(),
            duration_ms: 0.0,
            user: None,
            has_user_viewed: false,
            machine_name: machine_name.into(),
            custom_links_json: None,
            root: None,
            client_timings: None,
        }
    }

    pub fn timing_count(&self) -> usize {
        self.root
            .as_ref()
            .map(|root| root.depth_first().len())
            .unwrap_or(0)
    }
}
