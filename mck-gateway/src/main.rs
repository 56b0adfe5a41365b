//! Gateway binary: loads the cluster file, connects, and serves until signalled
use anyhow::Context;
use clap::Parser;
use mck_gateway::{config::Config, server, Gateway};
use std::{net::SocketAddr, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Multi-cluster Kubernetes API gateway
#[derive(Parser)]
#[command(name = "mck", version)]
struct App {
    /// Cluster configuration file
    #[arg(long, short, env = "MCK_CONFIG")]
    config: PathBuf,

    /// Listen address, overriding the configuration file
    #[arg(long, env = "MCK_LISTEN")]
    listen: Option<SocketAddr>,

    /// Cluster answering discovery, overriding the configuration file
    #[arg(long)]
    host_cluster: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mck_gateway=debug")),
        )
        .init();
    let app = App::parse();

    let mut config = Config::load(&app.config)?;
    if let Some(listen) = app.listen {
        config.listen = listen;
    }
    if let Some(host) = app.host_cluster {
        config.host_cluster = Some(host);
    }
    let registry = config.registry().await?;
    info!(clusters = registry.len(), host = registry.host_name(), "registry ready");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    server::serve(listener, Gateway::new(registry, shutdown), config.grace()).await?;
    info!("stopped");
    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
    token.cancel();
}
