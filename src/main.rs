// Server binary — boots tracing, extractor provisioning, and the HTTP relay.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audio_relay::config::RelayConfig;
use audio_relay::extractor::provision::BinaryProvisioner;
use audio_relay::server::handler::RelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = RelayConfig::from_env();
    let provisioner = Arc::new(BinaryProvisioner::new(
        config.binary_path.clone(),
        config.binary_source_url.clone(),
    ));

    // Fire-and-forget: requests arriving before this finishes are rejected
    // with retry guidance rather than queued behind the download.
    let startup = Arc::clone(&provisioner);
    tokio::spawn(async move {
        if let Err(err) = startup.ensure().await {
            warn!("extractor unavailable until retried: {err:#}");
        }
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let server = RelayServer::start(&addr, provisioner).await?;
    info!("relay server listening on port {}", server.port());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.shutdown();

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
