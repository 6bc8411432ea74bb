//! Server entry point.

use server::config::Config;
use server::error::ServerError;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = Config::from_env()?;
    server::telemetry::init_tracing(&config)?;
    let metrics_handle = server::telemetry::install_metrics()?;
    tracing::debug!(?config, "configuration loaded");

    let cancel = CancellationToken::new();
    let modules = server::build_modules(&config).await?;

    let seeded = modules.discount_rules.seed_defaults(&cancel).await?;
    if seeded > 0 {
        tracing::info!(rules = seeded, "seeded default discount rules");
    }

    let workers = modules
        .spawn_consumers(config.bus_poll_interval, cancel.clone())
        .await?;

    let app = server::create_app(metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    for worker in workers {
        if let Err(error) = worker.await {
            tracing::warn!(%error, "consumer worker ended abnormally");
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
