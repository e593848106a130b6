//! Agent health.
//!
//! Mirrors the host's `working?` contract: the agent is working when it
//! produced an event within the expected period and has not logged an
//! error since shortly before that event.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Error entries kept for inspection.
const MAX_RECENT_ERRORS: usize = 20;

/// An error recorded against the agent.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Activity timestamps and counters for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    pub started_at: DateTime<Utc>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_receive_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error_log_at: Option<DateTime<Utc>>,
    pub ticks_run: u64,
    pub events_created: u64,
    pub errors_logged: u64,
    pub recent_errors: VecDeque<ErrorEntry>,
}

impl Default for AgentHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentHealth {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            last_check_at: None,
            last_receive_at: None,
            last_event_at: None,
            last_error_log_at: None,
            ticks_run: 0,
            events_created: 0,
            errors_logged: 0,
            recent_errors: VecDeque::new(),
        }
    }

    /// Start from the history persisted in the event log, so health and
    /// the event counter survive a restart.
    pub fn with_history(last_event_at: Option<DateTime<Utc>>, events_created: u64) -> Self {
        Self {
            last_event_at,
            events_created,
            ..Self::new()
        }
    }

    pub fn record_check(&mut self) {
        self.last_check_at = Some(Utc::now());
        self.ticks_run += 1;
    }

    pub fn record_receive(&mut self) {
        self.last_receive_at = Some(Utc::now());
        self.ticks_run += 1;
    }

    pub fn record_events(&mut self, count: usize, at: DateTime<Utc>) {
        if count == 0 {
            return;
        }
        self.events_created += count as u64;
        self.last_event_at = Some(at);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        let at = Utc::now();
        self.last_error_log_at = Some(at);
        self.errors_logged += 1;
        self.recent_errors.push_back(ErrorEntry {
            at,
            message: message.into(),
        });
        while self.recent_errors.len() > MAX_RECENT_ERRORS {
            self.recent_errors.pop_front();
        }
    }

    /// An event was created less than `days` days before `now`.
    pub fn event_created_within(&self, days: u32, now: DateTime<Utc>) -> bool {
        match self.last_event_at {
            Some(at) => at > now - Duration::days(i64::from(days)),
            None => false,
        }
    }

    /// An error was logged after (or up to two minutes before) the last event.
    pub fn recent_error_logs(&self) -> bool {
        match (self.last_event_at, self.last_error_log_at) {
            (Some(event_at), Some(error_at)) => error_at > event_at - Duration::minutes(2),
            _ => false,
        }
    }

    pub fn is_working(&self, period_days: u32, now: DateTime<Utc>) -> bool {
        self.event_created_within(period_days, now) && !self.recent_error_logs()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
