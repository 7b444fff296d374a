use std::{cmp::Ordering, collections::BTreeMap};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of work a custom timing measured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecuteType {
    None,
    Read,
    Create,
    Update,
    Command,
}

impl ExecuteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecuteType::None => "None",
            ExecuteType::Read => "Read",
            ExecuteType::Create => "Create",
            ExecuteType::Update => "Update",
            ExecuteType::Command => "Command",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "None" => Ok(ExecuteType::None),
            "Read" => Ok(ExecuteType::Read),
            "Create" => Ok(ExecuteType::Create),
            "Update" => Ok(ExecuteType::Update),
            "Command" => Ok(ExecuteType::Command),
            other => Err(anyhow!("unknown execute type '{other}'")),
        }
    }
}

/// A keyed sub-measurement recorded against a [`Timing`], e.g. one database call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomTiming {
    pub id: Uuid,
    pub command_string: String,
    pub execute_type: ExecuteType,
    pub stack_trace_snippet: Option<String>,
    pub start_ms: f64,
    pub duration_ms: Option<f64>,
    pub first_fetch_duration_ms: Option<f64>,
}

impl CustomTiming {
    pub fn new(command_string: impl Into<String>, execute_type: ExecuteType, start_ms: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            command_string: command_string.into(),
            execute_type,
            stack_trace_snippet: None,
            start_ms,
            duration_ms: None,
            first_fetch_duration_ms: None,
        }
    }
}

/// One node of the timing tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub id: Uuid,
    pub name: String,
    pub start_ms: f64,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Timing>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_timings: BTreeMap<String, Vec<CustomTiming>>,
}

impl Timing {
    pub fn new(name: impl Into<String>, start_ms: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start_ms,
            duration_ms: 0.0,
            children: Vec::new(),
            custom_timings: BTreeMap::new(),
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn add_child(&mut self, child: Timing) {
        self.children.push(child);
    }

    pub fn add_custom_timing(&mut self, key: impl Into<String>, timing: CustomTiming) {
        self.custom_timings.entry(key.into()).or_default().push(timing);
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn has_custom_timings(&self) -> bool {
        self.custom_timings.values().any(|group| !group.is_empty())
    }

    /// Pre-order walk of this timing and all of its descendants.
    pub fn depth_first(&self) -> Vec<&Timing> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(timing) = stack.pop() {
            out.push(timing);
            stack.extend(timing.children.iter().rev());
        }
        out
    }
}

/// Orders by start offset, falling back to the id so equal offsets stay stable.
pub(crate) fn by_start_then_id(a_start: f64, a_id: &Uuid, b_start: f64, b_id: &Uuid) -> Ordering {
    a_start.total_cmp(&b_start).then_with(|| a_id.cmp(b_id))
}
