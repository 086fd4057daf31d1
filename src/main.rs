//! Security news service binary entrypoint
//! Boots the Axum HTTP server, the refresh loop and the classification worker.

use anyhow::Context;
use secnews::metrics::Metrics;
use secnews::{router, service_from_config, AppConfig};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs, `RUST_LOG` respected. Shuttle may already have installed a subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading news config")?;
    let (service, worker) = service_from_config(&cfg).context("wiring pipeline")?;

    let metrics = Metrics::init().context("installing metrics recorder")?;

    let _tasks = service.start_background(worker, cfg.classifier.sweep_interval());
    tracing::info!(
        interval_secs = cfg.refresh.interval_secs,
        "refresh loop started"
    );

    let app = router(service).merge(metrics.router());
    Ok(app.into())
}
