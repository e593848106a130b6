//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::engine::dispatcher::{SharedHealth, XeggexAgent};
use crate::health::ErrorEntry;
use crate::types::Record;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub agent_name: String,
    pub mode: String,
    pub dry_run: bool,
    pub period_days: u32,
    pub health: SharedHealth,
    /// Locked for the duration of an event-triggered tick; the scheduler
    /// takes the same lock.
    pub agent: Arc<Mutex<XeggexAgent>>,
}

impl DashboardState {
    /// Take ownership of the agent; clone `agent` to share it with the
    /// scheduler.
    pub fn new(agent: XeggexAgent) -> Self {
        Self {
            agent_name: agent.name().to_string(),
            mode: agent.options().mode.clone().unwrap_or_default(),
            dry_run: agent.is_dry_run(),
            period_days: agent.options().expected_receive_period_in_days(),
            health: agent.health(),
            agent: Arc::new(Mutex::new(agent)),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub working: bool,
    pub last_event_at: Option<String>,
    pub last_error_log_at: Option<String>,
    pub expected_receive_period_in_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub agent: String,
    pub mode: String,
    pub dry_run: bool,
    pub working: bool,
    pub ticks_run: u64,
    pub events_created: u64,
    pub errors_logged: u64,
    pub last_check_at: Option<String>,
    pub last_receive_at: Option<String>,
    pub last_event_at: Option<String>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ok: bool,
    pub fetched: usize,
    pub emitted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiveResponse {
    pub runs: Vec<RunSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
///
/// 200 when the agent is working, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.health.read().await;
    let working = health.is_working(state.period_days, Utc::now());
    let code = if working {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            working,
            last_event_at: health.last_event_at.map(|t| t.to_rfc3339()),
            last_error_log_at: health.last_error_log_at.map(|t| t.to_rfc3339()),
            expected_receive_period_in_days: state.period_days,
        }),
    )
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let health = state.health.read().await;
    let now = Utc::now();

    Json(StatusResponse {
        agent: state.agent_name.clone(),
        mode: state.mode.clone(),
        dry_run: state.dry_run,
        working: health.is_working(state.period_days, now),
        ticks_run: health.ticks_run,
        events_created: health.events_created,
        errors_logged: health.errors_logged,
        last_check_at: health.last_check_at.map(|t| t.to_rfc3339()),
        last_receive_at: health.last_receive_at.map(|t| t.to_rfc3339()),
        last_event_at: health.last_event_at.map(|t| t.to_rfc3339()),
        uptime_secs: (now - health.started_at).num_seconds(),
    })
}

/// GET /api/errors
pub async fn get_errors(State(state): State<AppState>) -> Json<Vec<ErrorEntry>> {
    let health = state.health.read().await;
    Json(health.recent_errors.iter().cloned().collect())
}

/// POST /api/events
///
/// Accepts one event object or an array of them and runs the agent once
/// per event, in order.
pub async fn post_events(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ReceiveResponse>, (StatusCode, Json<ErrorResponse>)> {
    let events = match parse_events(body) {
        Some(events) => events,
        None => {
            warn!("Rejected upstream delivery: body must be an object or array of objects");
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "expected an event object or an array of event objects".into(),
                }),
            ));
        }
    };

    let mut agent = state.agent.lock().await;
    let results = agent.receive(&events).await;

    let runs = results
        .into_iter()
        .map(|result| match result {
            Ok(report) => RunSummary {
                ok: true,
                fetched: report.fetched,
                emitted: report.emitted(),
                error: None,
            },
            Err(e) => RunSummary {
                ok: false,
                fetched: 0,
                emitted: 0,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(Json(ReceiveResponse { runs }))
}

fn parse_events(body: Value) -> Option<Vec<Record>> {
    match body {
        Value::Object(event) => Some(vec![event]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(event) => Some(event),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}
