//! Application entry point for the `asthma-status-engine` backend service.
//!
//! This binary orchestrates the startup sequence for the status engine API:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Building the remote document store client
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `STORE_URL` (**required**) – remote document store base URL
//! - `STORE_AUTH_TOKEN` (optional) – store access token
//! - `FETCH_TIMEOUT_MS`, `PEF_AVERAGE_WINDOW`, `UTC_OFFSET_MINUTES`,
//!   `HTTP_PORT` (optional) – see `config`
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, net::SocketAddr};

use anyhow::{Context, Result};
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use asthma_status_engine::{config, routes, HttpDocumentStore};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store = HttpDocumentStore::new(cfg.store_url.clone(), cfg.store_auth_token.clone());
    tracing::info!("Using document store at {}", cfg.store_url);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(store, cfg);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Install the subscriber behind every `tracing` call in the engine.
///
/// The aggregator opens one `alert_evaluation` / `alert_signals` span per
/// pass, tagged with its evaluation id, so span events matter here:
/// `AXUM_SPAN_EVENTS=full` shows each pass's enter/exit with timing,
/// `enter_exit` drops the timing, anything else logs only span close.
///
/// Level comes from `RUST_LOG` when set, otherwise `AXUM_LOG_LEVEL`
/// (default `debug`). hyper and reqwest are held at `warn` so per-child
/// store calls do not drown the engine's own lines. `FORCE_COLOR`
/// overrides TTY detection for ANSI output.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},hyper=warn,reqwest=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
