//! Wallet Ledger - Main Application Entry Point
//!
//! This is a REST API server for a custodial wallet ledger. It moves money
//! between wallets and out to partner banks, and settles payment plans from
//! incoming payroll.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Bank Gateway**: reqwest JSON client with timeout
//! - **Settlement**: background worker on the same runtime
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build the ledger context and start the settlement worker
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use wallet_ledger::{
    config::Config,
    context::LedgerContext,
    db,
    gateway::HttpBankGateway,
    handlers,
    services::settlement_worker::SettlementWorker,
    store::PgLedgerStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let gateway = HttpBankGateway::new(config.gateway_url()?, config.gateway_timeout())?;
    let ctx = LedgerContext::new(
        Arc::new(PgLedgerStore::new(pool)),
        Arc::new(gateway),
        config.ledger(),
    );

    // Settlement runs for the life of the process
    let worker = SettlementWorker::new(ctx.clone(), config.poll_interval());
    tokio::spawn(async move {
        worker.run().await;
    });

    let app = handlers::router(ctx)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http());

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
