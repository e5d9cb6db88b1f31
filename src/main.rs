//! Hypervisor control-plane daemon
//!
//! Serves the cluster/deployment HTTP API backed by the relational store and
//! the ordered-set queue store.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hypervisor::api::{AppState, RestApiServer};
use hypervisor::config::ConfigLoader;
use hypervisor::scheduler::{RedisQueueStore, Scheduler};
use hypervisor::store::Store;

#[derive(Parser)]
#[command(name = "hypervisord")]
#[command(about = "Multi-tenant cluster workload scheduler control plane")]
#[command(version)]
struct Cli {
    /// Address to bind the HTTP listener on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Database URL for entity state
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://hypervisor.db?mode=rwc")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_from_env().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let store = Store::connect(&cli.database_url)
        .await
        .context("connecting to database")?;
    tracing::info!(database_url = %cli.database_url, "database ready");

    let queue_store = RedisQueueStore::connect(&config.queue_store.url())
        .await
        .context("connecting to queue store")?;
    tracing::info!(url = %config.queue_store.url(), "queue store ready");

    let scheduler = Arc::new(Scheduler::new(Arc::new(queue_store)));
    let state = AppState {
        store,
        scheduler,
        config: Arc::new(config),
    };
    let app = RestApiServer::new(state).router();

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .context("binding listener")?;
    tracing::info!(addr = %cli.bind, "hypervisord listening");
    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
