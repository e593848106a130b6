//! Agent options.
//!
//! Options arrive the way the host stores them: loose strings that may
//! contain `{{ field }}` placeholders referring to the event that
//! triggered a run. They are validated once at startup (presence and
//! enum checks, aggregated) and resolved into [`ResolvedOptions`] at the
//! start of every tick.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::exchange::{Credentials, Endpoint, OrderQuery};
use crate::types::{AgentError, ConfigErrors, Mode, OrderStatus, Record};

/// Env vars consulted when the options leave credentials blank.
pub const API_KEY_ENV: &str = "XEGGEX_API_KEY";
pub const API_SECRET_ENV: &str = "XEGGEX_API_SECRET";

const TYPE_ERROR: &str = "type has invalid value: should be 'check_balance' 'check_orders'";
const STATUS_ERROR: &str = "status has invalid value: should be 'active' 'filled' 'cancelled'";
const PERIOD_ERROR: &str = "Please provide 'expected_receive_period_in_days' to indicate how many days can pass before this Agent is considered to be not working";

// ---------------------------------------------------------------------------
// Raw options
// ---------------------------------------------------------------------------

/// Options as configured, before interpolation.
///
/// Scalars in the TOML file (`debug = false`, `limit = 10`) are accepted
/// and stored in their string form.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    #[serde(rename = "type", deserialize_with = "scalar_string")]
    pub mode: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub api_key: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub api_secret: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub symbol: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub limit: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub debug: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub expected_receive_period_in_days: Option<String>,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            mode: Some("check_balance".into()),
            api_key: None,
            api_secret: None,
            symbol: None,
            status: Some("filled".into()),
            limit: Some("10".into()),
            debug: Some("false".into()),
            expected_receive_period_in_days: Some("2".into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Bool(bool),
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value.map(|s| match s {
        Scalar::Str(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Bool(b) => b.to_string(),
    }))
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn has_placeholder(value: &str) -> bool {
    value.contains("{{")
}

/// `"true"` / `"false"` only; anything else is not a boolean.
pub fn boolify(value: &str) -> Option<bool> {
    match value.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn positive_int(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

impl RawOptions {
    /// Fill blank credentials from environment variables.
    pub fn fill_credentials_from_env(&mut self, key_env: &str, secret_env: &str) {
        if !present(&self.api_key) {
            if let Ok(key) = std::env::var(key_env) {
                self.api_key = Some(key);
            }
        }
        if !present(&self.api_secret) {
            if let Ok(secret) = std::env::var(secret_env) {
                self.api_secret = Some(secret);
            }
        }
    }

    /// Startup validation. Every invalid field contributes one message.
    ///
    /// Values that still contain placeholders only need to be present;
    /// their typed checks run when the tick resolves them.
    pub fn validate(&self) -> Result<(), ConfigErrors> {
        let mut errors = ConfigErrors::default();

        let mode = self.mode.as_deref().filter(|m| !has_placeholder(m));
        let recognized = match mode {
            Some(m) => Mode::parse(m),
            None => None,
        };
        if let Some(m) = mode {
            if !m.is_empty() && recognized.is_none() {
                errors.push(TYPE_ERROR);
            }
        }

        if let Some(status) = self.status.as_deref() {
            if !status.is_empty() && !has_placeholder(status) && OrderStatus::parse(status).is_none() {
                errors.push(STATUS_ERROR);
            }
        }

        let templated_mode = self.mode.as_deref().map(has_placeholder).unwrap_or(false);
        if recognized.is_some() || templated_mode {
            if !present(&self.api_key) {
                errors.push("api_key is a required field");
            }
            if !present(&self.api_secret) {
                errors.push("api_secret is a required field");
            }
        }

        if recognized == Some(Mode::CheckOrders) {
            if !present(&self.symbol) {
                errors.push("symbol is a required field");
            }
            if !present(&self.status) {
                errors.push("status is a required field");
            }
            if !present(&self.limit) {
                errors.push("limit is a required field");
            }
        }

        if let Some(limit) = self.limit.as_deref() {
            if present(&self.limit) && !has_placeholder(limit) && positive_int(limit).is_none() {
                errors.push("limit must be a positive integer");
            }
        }

        if let Some(debug) = self.debug.as_deref() {
            if !has_placeholder(debug) && boolify(debug).is_none() {
                errors.push("if provided, debug must be true or false");
            }
        }

        match self.expected_receive_period_in_days.as_deref() {
            Some(p) if has_placeholder(p) || positive_int(p).is_some() => {}
            _ => errors.push(PERIOD_ERROR),
        }

        errors.into_result()
    }

    /// Interpolate against the triggering event (if any) and convert
    /// into typed options for one tick.
    pub fn resolve(&self, context: Option<&Record>) -> Result<ResolvedOptions, AgentError> {
        let render = |value: &Option<String>| -> String {
            value
                .as_deref()
                .map(|v| interpolate(v, context))
                .unwrap_or_default()
        };

        let mode_value = render(&self.mode);
        let mode = Mode::parse(mode_value.trim()).ok_or(AgentError::UnknownMode(mode_value))?;

        let mut errors = ConfigErrors::default();

        let api_key = render(&self.api_key);
        let api_secret = render(&self.api_secret);
        if api_key.trim().is_empty() {
            errors.push("api_key is a required field");
        }
        if api_secret.trim().is_empty() {
            errors.push("api_secret is a required field");
        }

        let debug_value = render(&self.debug);
        let debug = if debug_value.trim().is_empty() {
            false
        } else {
            boolify(&debug_value).unwrap_or_else(|| {
                errors.push("if provided, debug must be true or false");
                false
            })
        };

        let period = positive_int(&render(&self.expected_receive_period_in_days)).unwrap_or_else(|| {
            errors.push(PERIOD_ERROR);
            0
        });

        let endpoint = match mode {
            Mode::CheckBalance => Some(Endpoint::Balances),
            Mode::CheckOrders => {
                let symbol = render(&self.symbol);
                if symbol.trim().is_empty() {
                    errors.push("symbol is a required field");
                }
                let status_value = render(&self.status);
                let status = if status_value.trim().is_empty() {
                    errors.push("status is a required field");
                    None
                } else {
                    let parsed = OrderStatus::parse(status_value.trim());
                    if parsed.is_none() {
                        errors.push(STATUS_ERROR);
                    }
                    parsed
                };
                let limit_value = render(&self.limit);
                let limit = if limit_value.trim().is_empty() {
                    errors.push("limit is a required field");
                    None
                } else {
                    let parsed = positive_int(&limit_value);
                    if parsed.is_none() {
                        errors.push("limit must be a positive integer");
                    }
                    parsed
                };
                match (status, limit) {
                    (Some(status), Some(limit)) => Some(Endpoint::Orders(OrderQuery {
                        symbol: symbol.trim().to_string(),
                        status,
                        limit,
                    })),
                    _ => None,
                }
            }
        };

        errors.into_result()?;

        Ok(ResolvedOptions {
            mode,
            // Resolution only reaches here with every endpoint field valid.
            endpoint: endpoint.unwrap_or(Endpoint::Balances),
            credentials: Credentials {
                api_key,
                api_secret: SecretString::new(api_secret),
            },
            debug,
            expected_receive_period_in_days: period,
        })
    }

    /// Period used by the health check; falls back to the default of two
    /// days when the option is templated or invalid.
    pub fn expected_receive_period_in_days(&self) -> u32 {
        self.expected_receive_period_in_days
            .as_deref()
            .and_then(positive_int)
            .unwrap_or(2)
    }
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

/// Typed options for a single tick.
#[derive(Debug)]
pub struct ResolvedOptions {
    pub mode: Mode,
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    pub debug: bool,
    pub expected_receive_period_in_days: u32,
}

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

/// Replace `{{ path }}` placeholders with fields of `context`.
///
/// Paths are dot-separated (`{{ order.symbol }}`). Missing fields and
/// a missing context render as the empty string. An unterminated `{{`
/// is copied through untouched.
pub fn interpolate(template: &str, context: Option<&Record>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let path = after[..end].trim();
                if let Some(value) = context.and_then(|ctx| lookup(ctx, path)) {
                    out.push_str(&render_value(value));
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
