//! Event emission.
//!
//! Wraps the host's event stream (`EventSink`) and turns each new record
//! into exactly one event, in order. Nothing is batched or retried.

use async_trait::async_trait;
use tracing::debug;

use crate::types::{AgentError, Event, Record};

/// The host's event stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Persist and deliver a single event.
    async fn create_event(&self, event: &Event) -> Result<(), AgentError>;
}

/// Emits one event per record on behalf of a named agent.
pub struct EventEmitter {
    agent: String,
    sink: Box<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(agent: &str, sink: Box<dyn EventSink>) -> Self {
        Self {
            agent: agent.to_string(),
            sink,
        }
    }

    /// Emit a single event whose payload is `record`.
    pub async fn emit(&self, record: &Record) -> Result<Event, AgentError> {
        let event = Event::new(&self.agent, record.clone());
        self.sink.create_event(&event).await?;
        debug!(event_id = %event.id, "Event created");
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
