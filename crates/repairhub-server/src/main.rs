//! RepairHub Server: application entry point.
//!
//! Loads configuration, connects to SurrealDB, bootstraps the first admin
//! when configured, and runs the warranty-expiry sweep until interrupted.

use std::sync::Arc;

use chrono::Utc;
use repairhub_db::DbManager;
use repairhub_server::{LogConfig, ServerConfig, SurrealBackend};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.filter.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::load().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });
    init_tracing(&config.log);

    info!(
        database = %config.database.url,
        issuer = %config.auth.jwt_issuer,
        sweep_secs = config.lifecycle.expiry_sweep_secs,
        "starting RepairHub server"
    );

    let db = DbManager::connect(&config.database)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "database connection failed");
            std::process::exit(1);
        });

    let backend = Arc::new(SurrealBackend::from_db(&db, &config));

    if let Some(admin) = &config.bootstrap_admin {
        if let Err(e) = backend.bootstrap_admin(admin).await {
            error!(error = %e, kind = %e.kind().code(), "admin bootstrap failed");
            std::process::exit(1);
        }
    }

    let _dashboard = backend
        .feed()
        .subscribe_debounced(config.lifecycle.debounce(), |refresh| {
            info!(
                tables = ?refresh.tables,
                events = refresh.events,
                "lifecycle tables changed"
            );
        });

    let sweeper = {
        let backend = Arc::clone(&backend);
        let mut ticks = interval(config.lifecycle.expiry_sweep_interval());
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::spawn(async move {
            loop {
                ticks.tick().await;
                match backend.expire_lapsed_warranties(Utc::now()).await {
                    Ok(expired) if !expired.is_empty() => {
                        info!(count = expired.len(), "expiry sweep moved devices");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "expiry sweep failed"),
                }
            }
        })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    sweeper.abort();
    info!(orphan_alerts = backend.orphan_alerts(), "RepairHub server stopped");
}
