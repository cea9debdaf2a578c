use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::CadenceConfig;
use cadence_keys::{KeyManager, SqliteKeyStore};
use cadence_notes::SqliteNoteStore;
use cadence_scheduler::{
    HttpSchedulerGateway, ScheduleManager, ScheduleSettings, SqliteTriggerStore,
};
use cadence_slots::SqliteSlotStore;
use clap::Parser;
use tracing::{info, warn};

mod app;
mod auth;
mod error;
mod http;

#[derive(Parser, Debug)]
#[command(name = "cadence-gateway", version, about = "Schedule-and-publish gateway")]
struct Args {
    /// Path to cadence.toml. Falls back to $CADENCE_CONFIG, then
    /// ~/.cadence/cadence.toml.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_gateway=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();

    // load config: --config > CADENCE_CONFIG env > ~/.cadence/cadence.toml
    let config_path = args.config.or_else(|| std::env::var("CADENCE_CONFIG").ok());
    let config = CadenceConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        CadenceConfig::default()
    });
    for key in placeholder_secrets(&config) {
        warn!(key, "built-in default secret in use; set a real value");
    }

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // one SQLite file shared by every store
    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(&db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    drop(db);

    // each store owns its connection and runs its own idempotent schema init
    let notes = Arc::new(SqliteNoteStore::new(open(&db_path)?)?);
    let slots = Arc::new(SqliteSlotStore::new(open(&db_path)?)?);
    let triggers = Arc::new(SqliteTriggerStore::new(open(&db_path)?)?);
    let key_store = Arc::new(SqliteKeyStore::new(open(&db_path)?)?);
    info!("database migrations complete");

    let gateway = Arc::new(HttpSchedulerGateway::from_config(&config.scheduler));
    let publisher: Arc<dyn cadence_scheduler::Publisher> =
        Arc::from(cadence_scheduler::publish::from_config(&config.publish));
    info!(
        trigger_service = %config.scheduler.base_url,
        publisher = publisher.name(),
        "scheduling collaborators ready"
    );

    let schedules = ScheduleManager::new(
        notes.clone(),
        triggers,
        gateway,
        publisher,
        ScheduleSettings::from_config(&config),
    );
    let keys = KeyManager::from_config(key_store, &config.keys);

    let state = Arc::new(app::AppState::new(config, notes, slots, schedules, keys));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Cadence gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Open a connection that waits on a locked database instead of failing.
fn open(path: &str) -> rusqlite::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

/// Config keys that still hold their built-in placeholder secret.
fn placeholder_secrets(config: &CadenceConfig) -> Vec<&'static str> {
    let defaults = CadenceConfig::default();
    let mut keys = Vec::new();
    if config.gateway.auth.token.is_some() && config.gateway.auth.token == defaults.gateway.auth.token {
        keys.push("gateway.auth.token");
    }
    if config.scheduler.webhook_secret == defaults.scheduler.webhook_secret {
        keys.push("scheduler.webhook_secret");
    }
    if config.keys.signing_secret == defaults.keys.signing_secret {
        keys.push("keys.signing_secret");
    }
    keys
}
