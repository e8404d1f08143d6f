//! `sheetsync-server` binary.

use clap::Parser;
use sheetsync_server::{NetworkModule, ServerArgs, Services};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerArgs::parse().into_config()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if config.sheets.api_key.is_none() {
        tracing::warn!("API_KEY is not set; sheet requests will fail");
    }

    let services = Services::from_config(&config)?;
    let mut module = NetworkModule::new(config.network.clone(), services);
    let port = module.start().await?;
    info!(port, "sheetsync-server listening");

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
