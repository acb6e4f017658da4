//! Faucet service binary

use agent_faucet::api::{
    balance_handler, deposit_handler, health_handler, pricing_handler, request_balance_handler,
    request_free_handler, request_premium_handler, root_handler, status_handler,
};
use agent_faucet::{
    BalanceLedger, DevAgentVerifier, DevDisburser, DevPaymentVerifier, FaucetConfig,
    FaucetService, LedgerStore, PrefixDepositPolicy,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(long)]
    server_addr: Option<String>,

    /// Database path
    #[arg(long)]
    db_path: Option<String>,

    /// Free tier amount (in wei)
    #[arg(long)]
    free_amount: Option<String>,

    /// Premium tier amount (in wei)
    #[arg(long)]
    premium_amount: Option<String>,

    /// Premium tier price (in wei)
    #[arg(long)]
    premium_price: Option<String>,

    /// Free tier cooldown (seconds)
    #[arg(long)]
    cooldown_secs: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let env_filter = if args.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Agent Faucet Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = FaucetConfig::from_env();

    // Override with CLI arguments
    if let Some(addr) = args.server_addr {
        config.server_addr = addr;
    }

    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }

    if let Some(amount) = args.free_amount {
        config.free_amount = amount;
    }

    if let Some(amount) = args.premium_amount {
        config.premium_amount = amount;
    }

    if let Some(price) = args.premium_price {
        config.premium_price = price;
    }

    if let Some(cooldown) = args.cooldown_secs {
        config.cooldown_secs = cooldown;
    }

    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  Database path: {}", config.db_path);
    info!("  Free tier: {} wei every {}s", config.free_amount, config.cooldown_secs);
    info!(
        "  Premium tier: {} wei for {} wei",
        config.premium_amount, config.premium_price
    );
    info!("  Payment address: {}", config.payment_address);

    // Open the ledger store
    let store = Arc::new(LedgerStore::open(&config.db_path)?);
    let stats = store.statistics()?;
    info!(
        "Ledger opened: {} accounts, {} deposits, {} spends",
        stats.accounts, stats.deposits, stats.spends
    );

    // Wire the service with the dev capability implementations; a real
    // deployment swaps these for on-chain verification and transfer.
    let ledger = BalanceLedger::new(
        Arc::clone(&store),
        Arc::new(PrefixDepositPolicy::default()),
    );
    let service = Arc::new(FaucetService::new(
        config.clone(),
        store,
        ledger,
        Arc::new(DevAgentVerifier),
        Arc::new(DevPaymentVerifier),
        Arc::new(DevDisburser::default()),
    )?);
    info!("Faucet service initialized");

    // Build router
    let mut app = axum::Router::new()
        .route("/", axum::routing::get(root_handler))
        .route("/health", axum::routing::get(health_handler))
        .route("/api/status", axum::routing::get(status_handler))
        .route("/api/pricing", axum::routing::get(pricing_handler))
        .route("/api/balance/:agent_name", axum::routing::get(balance_handler))
        .route("/api/request", axum::routing::post(request_free_handler))
        .route("/api/request-premium", axum::routing::post(request_premium_handler))
        .route("/api/request-balance", axum::routing::post(request_balance_handler))
        .route("/api/deposit", axum::routing::post(deposit_handler))
        .with_state(service.clone());

    // Add CORS if enabled
    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        app = app.layer(cors);
        info!("CORS enabled");
    }

    // Start server
    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = service.flush() {
        warn!("Final ledger flush failed: {}", e);
    }

    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
