//! Startup and shutdown failures of the server binary.

use application::ApplicationError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("tracing already initialised: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to install Prometheus recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Persistence(#[from] persistence::PersistenceError),

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
