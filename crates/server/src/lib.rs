//! Composition root of the online store.
//!
//! Loads [`config::Config`], installs tracing and the Prometheus recorder,
//! wires the four modules over in-memory or PostgreSQL back ends, runs the
//! integration consumers and serves `/health` and `/metrics`.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use application::{BcryptHasher, Modules, Stores};
use axum::Router;
use axum::routing::get;
use messaging::{InMemoryMessageBus, MessageBus, PostgresMessageBus};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;

use config::Config;
use error::ServerError;

/// Creates the router serving the operational endpoints.
pub fn create_app(metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(routes::health::check))
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle)
        .layer(TraceLayer::new_for_http())
}

/// Wires the modules over the back ends selected by `config`.
///
/// With a `DATABASE_URL` the schema is migrated first and both the stores
/// and the bus share one connection pool.
pub async fn build_modules(config: &Config) -> Result<Modules, ServerError> {
    let hasher = Arc::new(BcryptHasher::new(config.bcrypt_cost));

    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("no DATABASE_URL set, using in-memory stores and bus");
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryMessageBus::new(config.bus));
        return Ok(Modules::new(Stores::in_memory(), bus, hasher));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;
    persistence::postgres::run_migrations(&pool).await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "connected to PostgreSQL and applied migrations"
    );

    let bus: Arc<dyn MessageBus> = Arc::new(PostgresMessageBus::new(pool.clone(), config.bus));
    Ok(Modules::new(Stores::postgres(pool), bus, hasher))
}
