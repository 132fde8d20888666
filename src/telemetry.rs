//! Logging and metrics setup

use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {}", level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

/// Install the Prometheus recorder and its scrape listener.
///
/// With no listen address metrics calls stay no-ops.
pub fn init_metrics(listen: Option<&str>) -> anyhow::Result<()> {
    let Some(listen) = listen else {
        return Ok(());
    };
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid metrics listen address: {}", listen))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("callwatch_session_mos".to_string()),
            &[1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0],
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    describe_metrics();
    info!("Prometheus metrics listening on {}", addr);
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "callwatch_sessions_created_total",
        "Total number of call sessions created"
    );
    describe_counter!(
        "callwatch_sessions_ended_total",
        "Total number of call sessions that reached a terminal state"
    );
    describe_counter!(
        "callwatch_samples_total",
        "Total number of transport statistics samples scored"
    );
    describe_counter!(
        "callwatch_bitrate_adjustments_total",
        "Total number of bitrate target changes"
    );
    describe_counter!(
        "callwatch_subscriber_disconnects_total",
        "Total number of subscribers removed"
    );
    describe_gauge!(
        "callwatch_active_sessions",
        "Number of non-terminal call sessions"
    );
    describe_gauge!("callwatch_subscribers", "Number of connected subscribers");
    describe_histogram!("callwatch_session_mos", "MOS of scored samples");
}
