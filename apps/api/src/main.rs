mod affordability;
mod cache;
mod config;
mod db;
mod errors;
mod ledger;
mod llm_client;
mod models;
mod principal;
mod roast;
mod routes;
mod state;
mod tiers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::postgres::PgCacheStore;
use crate::cache::CacheGate;
use crate::config::Config;
use crate::db::create_pool;
use crate::ledger::memory::MemoryLedgerStore;
use crate::ledger::postgres::PgLedgerStore;
use crate::ledger::UsageLedger;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("roaster_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Roaster API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Usage ledger: durable counters for signed-in users, in-process
    // counters for anonymous fingerprints (cleared on restart).
    let ledger = Arc::new(UsageLedger::new(
        Arc::new(PgLedgerStore::new(db.clone())),
        Arc::new(MemoryLedgerStore::new()),
    ));

    // Content cache in front of the model
    let cache = Arc::new(CacheGate::new(Arc::new(PgCacheStore::new(db))));

    // Build app state
    let state = AppState { ledger, cache, llm };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
