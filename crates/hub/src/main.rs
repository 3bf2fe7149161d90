mod config;
mod feed;
mod state;
mod web;

use anyhow::{Context, Result};
use std::{env, sync::Arc};
use tokio::io::BufReader;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use dripper_store::telemetry::SELF_TEST_PAYLOAD;
use dripper_store::{FsStorage, Stores};
use state::{HubState, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    let web_port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(cfg.web_port);

    // ── Stores ──────────────────────────────────────────────────────
    let storage = FsStorage::new(&cfg.data_dir);
    let stores = Arc::new(Stores::open(Arc::new(storage)));
    stores
        .load_all()
        .await
        .with_context(|| format!("failed to load stores from {}", cfg.data_dir))?;
    config::apply(&cfg, &stores).await?;

    // ── Shared state (ephemeral, for the web UI) ────────────────────
    let shared: SharedState = Arc::new(RwLock::new(HubState::new()));
    shared
        .write()
        .await
        .record_system("hub started".to_string());

    // ── Web server ──────────────────────────────────────────────────
    let web_state = web::AppState {
        hub: Arc::clone(&shared),
        stores: Arc::clone(&stores),
    };
    let web_task = tokio::spawn(async move {
        if let Err(e) = web::serve(web_state, web_port).await {
            tracing::error!("web server stopped: {e:#}");
        }
    });

    if cfg.self_test {
        tracing::info!("ingesting self-test payload");
        let outcome = stores
            .field_data
            .ingest_telemetry(SELF_TEST_PAYLOAD, true)
            .await;
        feed::record_outcome(&stores, &shared, outcome, "self-test").await;
    }

    // ── Telemetry feed ──────────────────────────────────────────────
    tracing::info!(terminator = %cfg.terminator, "reading telemetry from stdin");
    feed::run(
        BufReader::new(tokio::io::stdin()),
        &stores,
        &shared,
        &cfg.terminator,
    )
    .await?;
    shared
        .write()
        .await
        .record_system("telemetry feed closed".to_string());

    // stdin may be /dev/null under a service manager; keep the API up.
    tracing::info!("telemetry feed closed, status api keeps serving");
    tokio::select! {
        _ = web_task => {}
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            tracing::info!("interrupted, shutting down");
        }
    }
    stores.flush().await;
    Ok(())
}
