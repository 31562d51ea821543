//! Configuration loader for the `asthma-status-engine` service.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). Values are read through a lookup
//! function so the same parsing applies to the process environment and to
//! fixed maps in tests.
use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::FixedOffset;

/// Parse an optional numeric variable with a default value.
macro_rules! parse_var {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string variable.
macro_rules! require_var {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Base URL of the remote document store.
    pub store_url: String,

    /// Token passed to the store on every request, if the store needs one.
    pub store_auth_token: Option<String>,

    /// Bounded wait for each per-child status fetch.
    pub fetch_timeout: Duration,

    /// Number of most recent PEF readings averaged for the zone.
    pub pef_average_window: usize,

    /// Offset used to assign dose timestamps to calendar days.
    pub utc_offset: FixedOffset,

    /// Port the HTTP API listens on.
    pub http_port: u16,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `STORE_URL` – remote document store base URL
///
/// Optional:
/// - `STORE_AUTH_TOKEN` – store access token (default: none)
/// - `FETCH_TIMEOUT_MS` – per-fetch timeout (default: 5000)
/// - `PEF_AVERAGE_WINDOW` – readings per zone average (default: 3)
/// - `UTC_OFFSET_MINUTES` – calendar-day offset (default: 0)
/// - `HTTP_PORT` – listening port (default: 8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    load_from(|key| env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_from<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let store_url = require_var!(lookup, "STORE_URL");
    let store_auth_token = lookup("STORE_AUTH_TOKEN").filter(|t| !t.trim().is_empty());
    let fetch_timeout_ms = parse_var!(lookup, "FETCH_TIMEOUT_MS", u64, 5000);
    let pef_average_window = parse_var!(lookup, "PEF_AVERAGE_WINDOW", usize, 3);
    let utc_offset_minutes = parse_var!(lookup, "UTC_OFFSET_MINUTES", i32, 0);
    let http_port = parse_var!(lookup, "HTTP_PORT", u16, 8080);

    if fetch_timeout_ms == 0 {
        return Err(anyhow!("FETCH_TIMEOUT_MS must be at least 1"));
    }
    if pef_average_window == 0 {
        return Err(anyhow!("PEF_AVERAGE_WINDOW must be at least 1"));
    }
    let utc_offset = utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES out of range: {}", utc_offset_minutes))?;

    Ok(Config {
        store_url,
        store_auth_token,
        fetch_timeout: Duration::from_millis(fetch_timeout_ms),
        pef_average_window,
        utc_offset,
        http_port,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the store token while showing all configuration values that
    /// were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_token = match self.store_auth_token {
            Some(_) => "****",
            None => "(none)",
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  STORE_URL          : {}", self.store_url);
        tracing::info!("  STORE_AUTH_TOKEN   : {}", masked_token);
        tracing::info!("  FETCH_TIMEOUT_MS   : {}", self.fetch_timeout.as_millis());
        tracing::info!("  PEF_AVERAGE_WINDOW : {}", self.pef_average_window);
        tracing::info!("  UTC_OFFSET         : {}", self.utc_offset);
        tracing::info!("  HTTP_PORT          : {}", self.http_port);
    }
}
