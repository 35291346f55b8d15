use std::sync::Arc;

use defi_risk_orchestrator::{build_orchestrator, config::Settings, handlers::create_router, AppState};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    init_tracing(&settings);
    info!(environment = %settings.environment, "Starting DeFi Risk Orchestrator");

    let orchestrator = Arc::new(build_orchestrator(&settings)?);

    let shutdown = CancellationToken::new();
    let sweeper = orchestrator
        .store()
        .spawn_sweeper(settings.session.sweep_interval(), shutdown.clone());

    let state = AppState::new(Arc::clone(&orchestrator), settings.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_address()).await?;
    info!("API server listening on {}", settings.bind_address());
    info!("  GET /health");
    info!("  GET /metrics");
    info!("  GET /api/v1/assess/:protocol");
    info!("  GET /api/v1/units/status");
    info!("  GET /api/v1/protocols");

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
    match server.await {
        Ok(Err(e)) => error!("Web server error: {}", e),
        Err(e) => error!("Web server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    if let Err(e) = sweeper.await {
        error!("Session sweeper task failed: {}", e);
    }

    orchestrator.cleanup().await;
    info!("Shutting down DeFi Risk Orchestrator");
    Ok(())
}
