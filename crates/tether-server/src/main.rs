use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tether_core::store::memory::MemoryStore;
use tether_core::AppState;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_filter.clone())),
        )
        .init();

    let store = Arc::new(MemoryStore::new());
    for user in &config.seed.users {
        store.seed_user(&user.id, &user.username);
    }
    for group in &config.seed.groups {
        let members: Vec<&str> = group.members.iter().map(String::as_str).collect();
        store.seed_group(&group.id, &group.name, &group.admin_id, &members);
    }
    tracing::info!(
        users = config.seed.users.len(),
        groups = config.seed.groups.len(),
        "seeded in-memory store"
    );

    let state = AppState::new(store.clone(), store.clone(), store);
    let app = tether_gateway::gateway_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let bind_address = args.bind.unwrap_or(config.server.bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(%bind_address, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to install shutdown signal handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
