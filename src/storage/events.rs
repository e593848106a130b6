//! Event log.
//!
//! `EventSink` implementations standing in for the host's event stream:
//! a SQLite table (sqlx) for the standalone binary and an in-memory log
//! for tests and embedding.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::emitter::EventSink;
use crate::health::AgentHealth;
use crate::types::{AgentError, Event};

/// Default event database URL (`mode=rwc` creates the file if missing).
pub const DEFAULT_EVENT_DB: &str = "sqlite://xeggex_events.db?mode=rwc";

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Events appended to a SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    /// Open (or create) the database and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        // A single connection keeps `sqlite::memory:` on one database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await?;
        let log = Self { pool };
        log.migrate().await?;
        info!(url, "Event log ready");
        Ok(log)
    }

    /// A throwaway in-memory log.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT NOT NULL UNIQUE,
                agent      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload    TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert one event.
    pub async fn insert(&self, event: &Event) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query(
            "INSERT INTO events (id, agent, created_at, payload)
             VALUES (?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(&event.agent)
        .bind(event.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent events for `agent`, newest first.
    pub async fn recent(&self, agent: &str, limit: i64) -> Result<Vec<Event>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, agent, created_at, payload
             FROM events
             WHERE agent = ?
             ORDER BY seq DESC
             LIMIT ?",
        )
        .bind(agent)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let id: String = r.get("id");
                let created_at: String = r.get("created_at");
                let payload: String = r.get("payload");
                Ok(Event {
                    id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    agent: r.get("agent"),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
                        .with_timezone(&Utc),
                    payload: serde_json::from_str(&payload)
                        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                })
            })
            .collect()
    }

    /// Number of events stored for `agent`.
    pub async fn count(&self, agent: &str) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM events WHERE agent = ?")
            .bind(agent)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Health seeded from the stored history of `agent`.
    pub async fn load_health(&self, agent: &str) -> Result<AgentHealth, sqlx::Error> {
        let last_event_at = self.last_event_at(agent).await?;
        let stored = self.count(agent).await?;
        if let Some(at) = last_event_at {
            info!(agent, last_event_at = %at, events = stored, "Resumed from event log");
        }
        Ok(AgentHealth::with_history(
            last_event_at,
            u64::try_from(stored).unwrap_or_default(),
        ))
    }

    /// Creation time of the newest event for `agent`.
    pub async fn last_event_at(&self, agent: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        Ok(self
            .recent(agent, 1)
            .await?
            .into_iter()
            .next()
            .map(|e| e.created_at))
    }
}

#[async_trait]
impl EventSink for SqliteEventLog {
    async fn create_event(&self, event: &Event) -> Result<(), AgentError> {
        self.insert(event)
            .await
            .map_err(|e| AgentError::Emit(e.to_string()))?;
        debug!(event_id = %event.id, "Event stored");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Events kept in a shared vector. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventLog {
    events: Arc<Mutex<Vec<Event>>>,
    /// If set, `create_event` fails with this message.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events created so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Force subsequent `create_event` calls to fail.
    pub fn set_error(&self, msg: &str) {
        if let Ok(mut slot) = self.force_error.lock() {
            *slot = Some(msg.to_string());
        }
    }

    pub fn clear_error(&self) {
        if let Ok(mut slot) = self.force_error.lock() {
            *slot = None;
        }
    }
}

#[async_trait]
impl EventSink for MemoryEventLog {
    async fn create_event(&self, event: &Event) -> Result<(), AgentError> {
        let forced = self
            .force_error
            .lock()
            .map_err(|e| AgentError::Emit(e.to_string()))?
            .clone();
        if let Some(msg) = forced {
            return Err(AgentError::Emit(msg));
        }

        self.events
            .lock()
            .map_err(|e| AgentError::Emit(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
