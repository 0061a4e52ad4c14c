use anyhow::Result;
use axum::Router;
use ev_analytics_service::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;
    init_tracing(&cfg.logging);

    let app_state = controller::AppState::new(cfg.clone()).await?;

    #[allow(unused_mut)]
    let mut app: Router = api::router(app_state.clone(), &cfg);

    #[cfg(feature = "metrics")]
    {
        app = api::with_metrics(app);
    }

    let addr = cfg.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "starting EV analytics service");

    // Serve health checks while the models train
    let init_state = app_state.clone();
    tokio::spawn(async move {
        init_state.initialize_models().await;
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
