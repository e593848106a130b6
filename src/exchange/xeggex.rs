//! Xeggex REST client.
//!
//! API base: https://api.xeggex.com/api/v2
//! Auth: HTTP basic (`api_key` as user, `api_secret` as password).
//! Endpoints used:
//! - `GET /balances`
//! - `GET /getorders?symbol=..&status=..&limit=..&skip=0`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, info};

use super::{Credentials, Endpoint, ExchangeApi, FetchResponse};
use crate::types::AgentError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const BASE_URL: &str = "https://api.xeggex.com/api/v2";

/// Upper bound on a single request, connect through body.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct XeggexClient {
    http: Client,
    base_url: String,
}

impl XeggexClient {
    /// Create a client against `base_url`, or the public API when `None`.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("xeggex-agent/0.1.0")
            .build()
            .context("Failed to build HTTP client for Xeggex")?;

        let base_url = base_url
            .unwrap_or_else(|| BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for an endpoint.
    pub fn request_url(&self, endpoint: &Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path_and_query())
    }
}

#[async_trait]
impl ExchangeApi for XeggexClient {
    async fn fetch(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        debug: bool,
    ) -> Result<FetchResponse, AgentError> {
        let url = self.request_url(endpoint);
        debug!(url = %url, "Fetching from Xeggex");

        let resp = self
            .http
            .get(&url)
            .basic_auth(
                &credentials.api_key,
                Some(credentials.api_secret.expose_secret()),
            )
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AgentError::Network(format!("GET {url}: {e}")))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| AgentError::Network(format!("reading body from {url}: {e}")))?;

        info!(status, "request status : {status}");
        if debug {
            info!(body = %body, "body");
        }

        Ok(FetchResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
