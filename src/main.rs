// src/main.rs
//! review-alerts binary entrypoint.
//! Loads config and state, starts the poll + dispatch loops, and serves the
//! admin HTTP surface until Ctrl-C.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use review_alerts::telemetry::Metrics;
use review_alerts::{api, spawn_background_loops, AppState, Config};

/// `RUST_LOG` wins; otherwise info for this crate, warn for the rest.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("review_alerts=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = ?e, "ctrl-c handler failed");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::load_default().context("loading config")?;
    tracing::info!(
        poll_interval_secs = config.poll_interval_secs,
        alert_interval_secs = config.alert_interval_secs,
        max_reviews_shown = config.max_reviews_shown,
        "config loaded"
    );

    let metrics = Metrics::init()?;
    let state = AppState::from_config(config).await?;
    let loops = spawn_background_loops(&state);

    let app = api::router(state.clone()).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&state.config.listen)
        .await
        .with_context(|| format!("binding {}", state.config.listen))?;
    tracing::info!(addr = %state.config.listen, "admin api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    for handle in loops {
        handle.abort();
    }
    Ok(())
}
