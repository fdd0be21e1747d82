//! txn_ledger - Gateway binary
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│ Gateway  │───▶│LedgerService │───▶│  Store   │
//! │  (YAML)  │    │  (axum)  │    │(engine+cache)│    │(PG / mem)│
//! └──────────┘    └──────────┘    └──────────────┘    └──────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;

use txn_ledger::config::AppConfig;
use txn_ledger::db::{Database, schema};
use txn_ledger::gateway::{self, state::AppState};
use txn_ledger::{CacheStore, LedgerService, LedgerStore, MemoryLedgerStore, PgLedgerStore, TtlCache};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let Some(url) = config.postgres_url.as_deref() else {
        tracing::warn!("No postgres_url configured, using in-process store (data is not durable)");
        return Ok(Arc::new(MemoryLedgerStore::new()));
    };

    let db = Database::connect(url, &config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    if config.database.auto_migrate {
        schema::ensure_schema(db.pool()).await?;
    }
    Ok(Arc::new(PgLedgerStore::new(db.pool().clone())))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        app_config.gateway.port = port;
    }
    let _log_guard = txn_ledger::logging::init_logging(&app_config)?;

    tracing::info!("Starting txn_ledger in {} mode", env);

    let store = open_store(&app_config).await?;
    let cache: Arc<dyn CacheStore> = Arc::new(TtlCache::new(app_config.cache.max_entries));
    let ledger = Arc::new(LedgerService::new(
        store,
        cache,
        app_config.ledger_settings(),
    ));

    ledger
        .health_check()
        .await
        .context("Startup health check failed")?;

    gateway::run_server(&app_config.gateway, Arc::new(AppState::new(ledger))).await
}
