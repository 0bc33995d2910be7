use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::info;

mod abi;
mod aggregate;
mod api;
mod auth;
mod chains;
mod config;
mod devnet;
mod identity;
mod reputation;
mod runtime;
mod store;
mod types;
mod upgrade;
mod validation;
mod wallet;

use config::Config;
use devnet::{Chain, RegistryKind};
use runtime::Clock;
use store::{EventJournal, EventRecord};

pub struct AppState {
    pub config: Config,
    /// The hosted devnet; writes hold the lock for the whole call so calls are serialized
    pub chain: RwLock<Chain>,
    pub journal: EventJournal,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agent_registry=debug".parse()?),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!("Starting agent-registry v{}", env!("CARGO_PKG_VERSION"));
    info!("Chain: {}", config.chain_id);
    info!("Supported chains: {:?}", chains::supported_chain_ids());
    info!(
        "Chains with canonical registries: {:?}",
        chains::chains_with_registry()
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
    );

    // Initialize event journal (with Redis if configured)
    let journal = EventJournal::new(config.chain_id, config.redis_url.as_deref()).await;
    info!(
        "Storage backend: {}",
        if journal.has_redis() { "Redis" } else { "In-memory" }
    );
    info!(
        "Dev accounts: {} (mode: {})",
        config.dev_accounts.len(),
        config.key_mode().as_str()
    );

    // Boot the chain and journal the genesis initialization events
    let (chain, receipts) = Chain::genesis(config.chain_id, config.registry_owner, Clock::System)?;
    for receipt in &receipts {
        journal
            .append(EventRecord::from_receipt(config.chain_id, receipt))
            .await;
    }
    info!(
        "Registries: identity {:?}, reputation {:?}, validation {:?} (owner {:?})",
        chain.identity_address(),
        chain.registry_address(RegistryKind::Reputation),
        chain.registry_address(RegistryKind::Validation),
        config.registry_owner
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        chain: RwLock::new(chain),
        journal,
    });

    // Log API key status
    if config.api_key.is_some() {
        info!("API key authentication enabled");
    } else {
        info!("API key authentication disabled (open mode)");
    }
    if config.admin_api_key.is_none() {
        info!("ADMIN_API_KEY not set, admin routes disabled");
    }

    let app = api::routes::app(state);

    // Start server with graceful shutdown
    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
