//! Supervisor daemon.
//!
//! Configuration comes from environment variables:
//! - `PSUP_CONFIG_FILE`: one YAML file to load at startup
//! - `PSUP_CONFIG_DIR`: directory of YAML files to load at startup
//! - `PSUP_RUNTIME_DIR`: root for runtime directories (default /run)
//! - `PSUP_CONFLICT_AUTO_STOP`: stop conflicting processes instead of
//!   refusing a start ("true"/"false", default false)
//! - `PSUP_LOG_LEVEL` / `RUST_LOG`: log filter (default info)

use std::path::{Path, PathBuf};

use psup_engine::engine::{Engine, EngineConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_filter = std::env::var("PSUP_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_filter))
        .init();

    let mut config = EngineConfig::default();
    if let Ok(root) = std::env::var("PSUP_RUNTIME_DIR") {
        config.runtime_dir_root = PathBuf::from(root);
    }
    if let Ok(value) = std::env::var("PSUP_CONFLICT_AUTO_STOP") {
        config.conflict_auto_stop =
            matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
    }

    let engine = Engine::new(config);

    if let Ok(file) = std::env::var("PSUP_CONFIG_FILE") {
        match engine.load_config_file(Path::new(&file)) {
            Ok(ids) => info!(file = %file, processes = ids.len(), "loaded configuration"),
            Err(e) => error!(file = %file, error = %e, "failed to load configuration"),
        }
    }
    if let Ok(dir) = std::env::var("PSUP_CONFIG_DIR") {
        match engine.load_config_dir(Path::new(&dir)) {
            Ok(count) => info!(dir = %dir, processes = count, "loaded configuration directory"),
            Err(e) => error!(dir = %dir, error = %e, "failed to load configuration directory"),
        }
    }

    info!("supervisor running, waiting for shutdown signal");
    shutdown_signal().await;

    engine.shutdown().await;
    info!("supervisor stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
