//! Shared types for the Xeggex agent.
//!
//! Records are kept as raw JSON objects: the agent never interprets
//! balance or order fields, it only compares them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Records & payloads
// ---------------------------------------------------------------------------

/// One balance or order row exactly as the exchange returned it.
///
/// `serde_json::Map` compares by key/value, so two records are equal
/// regardless of the key order in the response body.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Ordered list of records returned by one API call.
pub type Payload = Vec<Record>;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Which endpoint the agent polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    CheckBalance,
    CheckOrders,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "check_balance" => Some(Mode::CheckBalance),
            "check_orders" => Some(Mode::CheckOrders),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::CheckBalance => "check_balance",
            Mode::CheckOrders => "check_orders",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status filter accepted by `/getorders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(OrderStatus::Active),
            "filled" => Some(OrderStatus::Filled),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An event as handed to the host's event stream.
///
/// `payload` is the record verbatim; the envelope fields belong to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub agent: String,
    pub created_at: DateTime<Utc>,
    pub payload: Record,
}

impl Event {
    pub fn new(agent: &str, payload: Record) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent: agent.to_string(),
            created_at: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

/// Summary of one completed tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub mode: Mode,
    /// HTTP status returned by the exchange.
    pub status_code: u16,
    /// Records in the fetched payload.
    pub fetched: usize,
    /// Records classified as new, in payload order.
    pub new_records: Payload,
    /// Payload was identical to the snapshot; nothing was compared.
    pub fast_path: bool,
    /// Record-to-record equality checks performed by the diff.
    pub comparisons: usize,
    /// Events were not emitted and the snapshot was left untouched.
    pub dry_run: bool,
}

impl TickReport {
    pub fn emitted(&self) -> usize {
        if self.dry_run {
            0
        } else {
            self.new_records.len()
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Aggregated option validation failures, one message per invalid field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigErrors(pub Vec<String>);

impl ConfigErrors {
    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn into_result(self) -> Result<(), ConfigErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

impl std::error::Error for ConfigErrors {}

/// Domain-specific error types for the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response (HTTP {status}): {message}")]
    MalformedResponse { status: u16, message: String },

    #[error("Invalid options: {0}")]
    Config(#[from] ConfigErrors),

    #[error("type has an invalid value ({0})")]
    UnknownMode(String),

    #[error("Snapshot storage error: {0}")]
    Storage(String),

    #[error("Failed to emit event: {0}")]
    Emit(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
