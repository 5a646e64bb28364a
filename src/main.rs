use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use murmur::api;
use murmur::cli;
use murmur::node::Node;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();
    settings.validate()?;
    let http_address = settings.http_listen_addr()?;

    let node = Node::new(settings.clone());
    let api = api::api(node.view());

    info!(
        "Starting murmur member {} with gossip on {} and API on {}",
        settings.member_id(),
        settings.udp_listen_addr()?,
        http_address
    );
    let gossip = tokio::spawn(node.run(shutdown_signal()));

    axum::Server::bind(&http_address)
        .serve(api.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gossip.await??;
    Ok(())
}
