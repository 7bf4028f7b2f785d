use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use grognon_core::GrognonConfig;
use grognon_server::{background::spawn_periodic, AppState};
use grognon_store::Store;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str =
    "grognon_server=info,grognon_core=info,grognon_store=info,grognon_connections=info,grognon_crons=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    // config: GROGNON_CONFIG env > ./grognon.toml
    let config_path = std::env::var("GROGNON_CONFIG").ok();
    let config = GrognonConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        GrognonConfig::default()
    });

    // metadata store: creating the data dir and migrating must succeed
    let db_path = config.data.db_path();
    let store = Store::open(&db_path)
        .with_context(|| format!("opening metadata store at {}", db_path.display()))?;

    let state = Arc::new(AppState::new(config, store));

    let registry = Arc::clone(&state.registry);
    let live = tokio::task::spawn_blocking(move || registry.setup())
        .await?
        .context("setting up connections")?;
    info!(live, "connections set up");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let engine = tokio::spawn(state.engine().run(shutdown_rx.clone()));

    let reflector = Arc::clone(&state.reflector);
    let reflection = spawn_periodic(
        "reflection",
        Duration::from_secs(state.config.connections.reflect_secs),
        true,
        shutdown_rx.clone(),
        move || match reflector.reflect_all() {
            Ok(n) => info!(reflected = n, "reflection pass finished"),
            Err(e) => error!("reflection pass failed: {e}"),
        },
    );

    let registry = Arc::clone(&state.registry);
    let refresh = spawn_periodic(
        "connection refresh",
        Duration::from_secs(state.config.connections.refresh_secs),
        false,
        shutdown_rx,
        move || match registry.refresh() {
            Ok(live) => info!(live, "connections refreshed"),
            Err(e) => error!("connection refresh failed: {e}"),
        },
    );

    info!("Grognon running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // signal background loops to stop and let in-flight work finish
    let _ = shutdown_tx.send(true);
    for (name, task) in [("engine", engine), ("reflection", reflection), ("refresh", refresh)] {
        if let Err(e) = task.await {
            error!(task = name, "background task ended abnormally: {e}");
        }
    }
    info!("Grognon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_names_every_workspace_crate() {
        tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).unwrap();
        for krate in [
            "grognon_server",
            "grognon_core",
            "grognon_store",
            "grognon_connections",
            "grognon_crons",
        ] {
            assert!(
                DEFAULT_LOG_FILTER.contains(&format!("{krate}=info")),
                "{krate} missing from default filter"
            );
        }
    }
}
