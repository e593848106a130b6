//! Exchange access.
//!
//! Defines the `ExchangeApi` trait (one authenticated GET per tick) and
//! the request/response shapes shared by the Xeggex client and the test
//! doubles. Body parsing lives here so every implementation classifies
//! malformed responses the same way.

pub mod xeggex;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::types::{AgentError, OrderStatus, Payload, Record};

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// Basic-auth credentials. The secret never shows up in `Debug` output.
#[derive(Debug)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: SecretString,
}

/// Query parameters for `/getorders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub symbol: String,
    pub status: OrderStatus,
    pub limit: u32,
}

/// Which resource a tick reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Balances,
    Orders(OrderQuery),
}

impl Endpoint {
    /// Path and query relative to the API base URL.
    pub fn path_and_query(&self) -> String {
        match self {
            Endpoint::Balances => "/balances".to_string(),
            Endpoint::Orders(q) => format!(
                "/getorders?symbol={}&status={}&limit={}&skip=0",
                urlencoding::encode(&q.symbol),
                q.status,
                q.limit,
            ),
        }
    }
}

/// Raw HTTP result of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    /// Parse the body into a payload (see [`parse_payload`]).
    pub fn payload(&self) -> Result<Payload, AgentError> {
        parse_payload(self.status, &self.body)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the exchange REST API.
///
/// Implementors issue exactly one GET and report transport failures as
/// `AgentError::Network`. The HTTP status is returned, not interpreted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn fetch(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        debug: bool,
    ) -> Result<FetchResponse, AgentError>;
}

// ---------------------------------------------------------------------------
// Body parsing
// ---------------------------------------------------------------------------

/// Parse a response body into a list of records.
///
/// Fails with `MalformedResponse` when the body is not JSON, is not an
/// array, or contains an element that is not an object.
pub fn parse_payload(status: u16, body: &str) -> Result<Payload, AgentError> {
    let malformed = |message: String| AgentError::MalformedResponse { status, message };

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {e}")))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(malformed(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(record) => Ok::<Record, AgentError>(record),
            other => Err(malformed(format!(
                "element {i} is {}, expected an object",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
