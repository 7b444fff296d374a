//! Builds a [`Session`] while the work it describes is running.

use std::{future::Future, time::Instant};

use uuid::Uuid;

use crate::command::Operation;
use crate::models::{ClientTiming, ClientTimings, CustomTiming, Session, Timing};
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;

pub struct Recorder {
    origin: Instant,
    session: Session,
    root: Timing,
    open: Vec<Timing>,
}

impl Recorder {
    pub fn start(name: impl Into<String>, machine_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            origin: Instant::now(),
            session: Session::new(name.clone(), machine_name),
            root: Timing::new(name, 0.0),
            open: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn set_user(&mut self, user: impl Into<String>) {
        self.session.user = Some(user.into());
    }

    /// Number of steps opened below the root and not yet finished.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    fn elapsed_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn current_mut(&mut self) -> &mut Timing {
        self.open.last_mut().unwrap_or(&mut self.root)
    }

    pub fn step(&mut self, name: impl Into<String>) {
        let timing = Timing::new(name, self.elapsed_ms());
        self.open.push(timing);
    }

    /// Closes the innermost step. Returns false when only the root is open.
    pub fn finish_step(&mut self) -> bool {
        let now = self.elapsed_ms();
        let Some(mut timing) = self.open.pop() else {
            return false;
        };
        timing.duration_ms = now - timing.start_ms;
        self.current_mut().add_child(timing);
        true
    }

    /// Awaits `call` and records it as a custom timing on the innermost step.
    pub async fn record<F, T>(&mut self, key: &str, operation: &Operation, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let start_ms = self.elapsed_ms();
        let began = Instant::now();
        let output = call.await;
        let duration_ms = began.elapsed().as_secs_f64() * 1000.0;

        let mut custom = CustomTiming::new(operation.render(), operation.execute_type(), start_ms);
        custom.duration_ms = Some(duration_ms);
        log_debug!("{key} call took {duration_ms:.3}ms: {}", custom.command_string);
        self.current_mut().add_custom_timing(key, custom);

        output
    }

    pub fn add_client_timing(&mut self, name: impl Into<String>, start_ms: f64, duration_ms: f64) {
        self.session
            .client_timings
            .get_or_insert_with(ClientTimings::default)
            .timings
            .push(ClientTiming::new(name, start_ms, duration_ms));
    }

    pub fn set_redirect_count(&mut self, redirect_count: u32) {
        self.session
            .client_timings
            .get_or_insert_with(ClientTimings::default)
            .redirect_count = redirect_count;
    }

    /// Closes every open step and returns the finished session.
    pub fn finish(mut self) -> Session {
        while self.finish_step() {}

        let total = self.elapsed_ms();
        self.root.duration_ms = total;
        self.session.duration_ms = total;
        self.session.root = Some(self.root);

        log_info!(
            "Recorded session {} ({} timings, {total:.3}ms)",
            self.session.id,
            self.session.timing_count()
        );
        self.session
    }
}
