//! The `escapade` server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use escapade::prelude::*;
use tracing_subscriber::EnvFilter;

/// Room runtime engine for escape rooms.
#[derive(Debug, Parser)]
#[command(name = "escapade", version, about)]
struct Args {
    /// Address the WebSocket listener binds to.
    #[arg(long, env = "ESCAPADE_WS_ADDR", default_value = "0.0.0.0:3001")]
    ws_addr: String,

    /// Address the HTTP API binds to.
    #[arg(long, env = "ESCAPADE_HTTP_ADDR", default_value = "0.0.0.0:3000")]
    http_addr: String,

    /// Directory holding one `<roomId>.json` record per room.
    #[arg(long, env = "ESCAPADE_DATA_DIR", default_value = "./data/rooms")]
    data_dir: PathBuf,

    /// Forget fired time triggers when a timer is reset.
    #[arg(long, env = "ESCAPADE_CLEAR_TRIGGERS_ON_RESET", default_value_t = false)]
    clear_triggers_on_reset: bool,

    /// Seconds between write-behind flushes of room records.
    #[arg(long, env = "ESCAPADE_PERSIST_INTERVAL_SECS", default_value_t = 5)]
    persist_interval_secs: u64,

    /// Seconds a socket may stay silent before it is dropped.
    #[arg(long, env = "ESCAPADE_IDLE_TIMEOUT_SECS", default_value_t = 60)]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), EscapadeError> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = JsonFileStore::open(args.data_dir.clone()).await?;
    tracing::info!(data_dir = %args.data_dir.display(), "room store opened");

    let engine = EngineConfig {
        clear_triggers_on_reset: args.clear_triggers_on_reset,
        persist_interval: Duration::from_secs(args.persist_interval_secs),
        ..EngineConfig::default()
    };

    let server = EscapadeServerBuilder::new()
        .ws_bind(&args.ws_addr)
        .http_bind(&args.http_addr)
        .engine_config(engine)
        .idle_timeout(Duration::from_secs(args.idle_timeout_secs.max(1)))
        .build(store)
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
