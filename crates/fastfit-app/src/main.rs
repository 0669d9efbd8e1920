use std::sync::Arc;

use fastfit_hex::application::order_service::OrderService;
use fastfit_hex::config::Config;
use fastfit_hex::inbound::http::HttpServerConfig;
use fastfit_repo::{build_repo, Repo};
use fastfit_types::ports::clock::{SystemClock, UuidV4Generator};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for DATABASE_URL / SERVER_PORT when present.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let repo: Repo = build_repo(config.database_url.as_deref()).await?;
    let service = Arc::new(OrderService::new(
        Arc::new(repo),
        Arc::new(SystemClock),
        Arc::new(UuidV4Generator),
        config.scheduler(),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
            }
        }
    });

    let server_cfg = HttpServerConfig {
        port: config.server_port.clone(),
        default_restaurant_id: config.default_restaurant_id,
        default_currency: config.default_currency.clone(),
    };
    fastfit_app::run(service, server_cfg, shutdown).await
}
