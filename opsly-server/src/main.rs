use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use opsly_server::{app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = app::load_config();
    config.validate_required()?;
    let snapshot = config.snapshot();

    let state = AppState::from_config(snapshot.clone())?;
    let router = app::router(state.clone());

    let host = snapshot.get("http.host").unwrap_or("127.0.0.1");
    let port = snapshot.get("http.port").unwrap_or("3000");
    let addr = format!("{host}:{port}");

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "opsly-server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("draining store connections");
    if let Err(err) = state.connections.close_all().await {
        tracing::error!(error = %err, "connection drain failed");
        std::process::exit(1);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
