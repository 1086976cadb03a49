use anyhow::{Context, Result};
use gdelt_events_collector::{Collector, Config};
use reqwest::Client;
use std::{env, path::PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    // usage: gdelt-events-collector [CONFIG_FILE]
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    info!(
        last_update_url = %config.last_update_url,
        merged = %config.merged_events_path().display(),
        period_secs = config.collection_period_secs,
        keep_raw = config.keep_raw_events_file,
        "configuration loaded"
    );

    // ─── 3) collector ────────────────────────────────────────────────
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("building HTTP client")?;
    let mut collector = Collector::from_config(client, &config)?;

    // ─── 4) poll until Ctrl+C ────────────────────────────────────────
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    collector
        .collect_periodically(
            config.collection_period_secs,
            config.keep_raw_events_file,
            interrupted,
        )
        .await?;

    // interrupted runs exit with status 1
    info!("detected a keyboard interrupt, exiting");
    eprintln!("detected a keyboard interrupt, exiting");
    std::process::exit(1);
}
