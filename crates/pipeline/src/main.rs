//! Drowsy Monitor - Main Entry Point

use std::path::PathBuf;

use anyhow::Context;
use pipeline::{init_logging, init_metrics, run_until, AppConfig};
use tracing::info;

/// Configuration file used when `DROWSY_CONFIG` is not set
const DEFAULT_CONFIG: &str = "drowsy.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("DROWSY_CONFIG")
        .map(PathBuf::from)
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG);
            default.exists().then_some(default)
        });

    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.log_level, config.log_json)?;

    info!("=== Drowsy Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Configuration: {}", path.display());
    }

    if let Some(addr) = &config.metrics_addr {
        init_metrics(addr)?;
    }

    let summary = run_until(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    info!(
        "Processed {} frames ({} alert frames){}",
        summary.frames,
        summary.alert_frames,
        if summary.interrupted { ", interrupted" } else { "" }
    );
    Ok(())
}
