//! Structured logging and Prometheus metrics.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::ServerError;

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) -> Result<(), ServerError> {
    let filter = EnvFilter::try_new(&config.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }
    Ok(())
}

/// Installs the Prometheus recorder and describes the counters the
/// workspace emits.
pub fn install_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("uow_commits_total", "Unit-of-work commits");
    metrics::describe_histogram!(
        "uow_commit_duration_seconds",
        metrics::Unit::Seconds,
        "Unit-of-work commit latency"
    );
    metrics::describe_counter!(
        "domain_events_dispatched_total",
        "Domain events handed to in-process handlers"
    );
    metrics::describe_counter!(
        "domain_event_handlers_deferred_total",
        "Secondary effects left for a later retry"
    );
    metrics::describe_counter!("bus_messages_published_total", "Integration messages published");
    metrics::describe_counter!("bus_messages_consumed_total", "Integration messages acked");
    metrics::describe_counter!("bus_messages_redelivered_total", "Integration messages nacked");
    metrics::describe_counter!(
        "bus_messages_dead_lettered_total",
        "Integration messages given up on"
    );
    metrics::describe_counter!("sales_created_total", "Sales created from carts");
    metrics::describe_counter!("carts_finalized_total", "Carts finalized, by reason");
}
