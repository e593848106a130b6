//! Mode dispatcher.
//!
//! One `XeggexAgent` per configured agent. Both entry points run the
//! same action: resolve options, fetch, diff against the snapshot, emit
//! the new records, overwrite the snapshot.
//!
//! Tick entry points take `&mut self`, so a caller can only run one tick
//! at a time per agent.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use super::diff::diff;
use super::emitter::{EventEmitter, EventSink};
use crate::exchange::ExchangeApi;
use crate::health::AgentHealth;
use crate::options::RawOptions;
use crate::storage::SnapshotRepository;
use crate::types::{AgentError, Record, TickReport};

/// Health shared with the dashboard.
pub type SharedHealth = Arc<RwLock<AgentHealth>>;

pub struct XeggexAgent {
    name: String,
    options: RawOptions,
    dry_run: bool,
    exchange: Box<dyn ExchangeApi>,
    snapshots: Box<dyn SnapshotRepository>,
    emitter: EventEmitter,
    health: SharedHealth,
}

impl XeggexAgent {
    pub fn new(
        name: &str,
        options: RawOptions,
        exchange: Box<dyn ExchangeApi>,
        snapshots: Box<dyn SnapshotRepository>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            name: name.to_string(),
            options,
            dry_run: false,
            exchange,
            snapshots,
            emitter: EventEmitter::new(name, sink),
            health: Arc::new(RwLock::new(AgentHealth::new())),
        }
    }

    /// Fetch and diff without emitting or touching the snapshot.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use an existing health record (e.g. seeded from the event log).
    pub fn with_health(mut self, health: SharedHealth) -> Self {
        self.health = health;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn options(&self) -> &RawOptions {
        &self.options
    }

    pub fn health(&self) -> SharedHealth {
        Arc::clone(&self.health)
    }

    /// Whether the host should consider this agent healthy right now.
    pub async fn is_working(&self) -> bool {
        let period = self.options.expected_receive_period_in_days();
        self.health.read().await.is_working(period, Utc::now())
    }

    /// Scheduled tick.
    pub async fn check(&mut self) -> Result<TickReport, AgentError> {
        self.health.write().await.record_check();
        self.trigger_action(None).await
    }

    /// Upstream-event tick: one independent run per incoming event, in
    /// order. A failed run does not stop the remaining ones.
    pub async fn receive(&mut self, events: &[Record]) -> Vec<Result<TickReport, AgentError>> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            info!(
                agent = %self.name,
                event = %serde_json::Value::Object(event.clone()),
                "Received event"
            );
            self.health.write().await.record_receive();
            results.push(self.trigger_action(Some(event)).await);
        }
        results
    }

    async fn trigger_action(&mut self, context: Option<&Record>) -> Result<TickReport, AgentError> {
        let result = self.run(context).await;
        match &result {
            Ok(report) => info!(
                agent = %self.name,
                mode = %report.mode,
                status = report.status_code,
                fetched = report.fetched,
                new = report.new_records.len(),
                fast_path = report.fast_path,
                dry_run = report.dry_run,
                "Tick complete"
            ),
            Err(e) => {
                error!(agent = %self.name, error = %e, "Error: {e}");
                self.health.write().await.record_error(e.to_string());
            }
        }
        result
    }

    async fn run(&self, context: Option<&Record>) -> Result<TickReport, AgentError> {
        let resolved = self.options.resolve(context)?;
        let debug = resolved.debug;

        let response = self
            .exchange
            .fetch(&resolved.endpoint, &resolved.credentials, debug)
            .await?;
        let payload = response.payload()?;

        let snapshot = self.snapshots.read()?;
        if debug {
            if let Some(previous) = &snapshot {
                info!(memory = %serde_json::to_string(previous).unwrap_or_default(), "memory");
            }
        }

        let outcome = diff(&payload, snapshot.as_deref(), debug);

        let mut report = TickReport {
            mode: resolved.mode,
            status_code: response.status,
            fetched: payload.len(),
            new_records: Vec::new(),
            fast_path: outcome.fast_path,
            comparisons: outcome.comparisons,
            dry_run: self.dry_run,
        };

        if self.dry_run {
            info!(
                agent = %self.name,
                would_emit = outcome.new_records.len(),
                "Dry run: events not emitted, snapshot not written"
            );
            report.new_records = outcome.new_records;
            return Ok(report);
        }

        for record in &outcome.new_records {
            let event = self.emitter.emit(record).await?;
            self.health.write().await.record_events(1, event.created_at);
        }

        self.snapshots.write(&payload)?;

        report.new_records = outcome.new_records;
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
