//! # Service Configuration
//!
//! Built from environment variables. Every variable is optional; a variable
//! that is set but unparseable fails startup instead of silently falling
//! back to the default.
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | `8080` |
//! | `AUTH_TOKEN` | unset (auth disabled) |
//! | `FORGE_TRANSACTION_SETTLEMENT` | `staged` |
//! | `FORGE_DISPATCH_MAX_ATTEMPTS` | `3` |
//! | `FORGE_DISPATCH_TIMEOUT_MS` | `2000` |
//! | `FORGE_DISPATCH_BACKOFF_MS` | `100` |
//! | `FORGE_LOG_FORMAT` | `text` |

use std::str::FromStr;
use std::time::Duration;

use forge_lifecycle::DispatchPolicy;
use forge_state::{TransactionSettlement, TransitionPolicy};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?} (expected \"text\" or \"json\")")),
        }
    }
}

/// Application configuration.
///
/// Custom `Debug` redacts the auth token.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub auth_token: Option<String>,
    pub transition_policy: TransitionPolicy,
    pub dispatch: DispatchPolicy,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            transition_policy: TransitionPolicy::default(),
            dispatch: DispatchPolicy::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("transition_policy", &self.transition_policy)
            .field("dispatch", &self.dispatch)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_var(&lookup, "PORT", defaults.port)?;
        let auth_token = lookup("AUTH_TOKEN").filter(|t| !t.is_empty());
        let transaction_settlement: TransactionSettlement = parse_var(
            &lookup,
            "FORGE_TRANSACTION_SETTLEMENT",
            defaults.transition_policy.transaction_settlement,
        )?;
        let max_attempts: u32 = parse_var(
            &lookup,
            "FORGE_DISPATCH_MAX_ATTEMPTS",
            defaults.dispatch.max_attempts,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "FORGE_DISPATCH_MAX_ATTEMPTS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let timeout_ms: u64 = parse_var(
            &lookup,
            "FORGE_DISPATCH_TIMEOUT_MS",
            defaults.dispatch.attempt_timeout.as_millis() as u64,
        )?;
        let backoff_ms: u64 = parse_var(
            &lookup,
            "FORGE_DISPATCH_BACKOFF_MS",
            defaults.dispatch.backoff.as_millis() as u64,
        )?;
        let log_format = parse_var(&lookup, "FORGE_LOG_FORMAT", defaults.log_format)?;

        Ok(Self {
            port,
            auth_token,
            transition_policy: TransitionPolicy {
                transaction_settlement,
            },
            dispatch: DispatchPolicy {
                max_attempts,
                attempt_timeout: Duration::from_millis(timeout_ms),
                backoff: Duration::from_millis(backoff_ms),
            },
            log_format,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
