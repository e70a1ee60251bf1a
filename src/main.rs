use std::process::ExitCode;

use gdsi::app::{AppState, build_router};
use gdsi::core::config::Config;
use gdsi::core::db::connect_and_migrate;
use tokio::signal;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    tracing::info!(
        addr = %config.listen_addr,
        access_lifetime_secs = config.jwt.access_token_lifetime.num_seconds(),
        refresh_lifetime_secs = config.jwt.refresh_token_lifetime.num_seconds(),
        bcrypt_cost = config.bcrypt_cost,
        "Config loaded"
    );

    let pool = connect_and_migrate(&config.database).await?;
    let app = build_router(AppState::new(pool, &config));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gdsi exited with an error");
            ExitCode::FAILURE
        }
    }
}
