//! APK Finder Server - indexes APKs on SMB shares and serves them over HTTP.

use anyhow::Result;
use apk_finder_core::{parse_interval, ApkFinder, RetryConfig, ShareConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_API_TOKEN: &str = "default_token";

#[derive(Parser, Debug)]
#[command(name = "apk-finder-server")]
#[command(about = "APK Finder HTTP API server")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "SERVER_PORT", default_value = "9301")]
    port: u16,

    /// Bearer token required on /api endpoints
    #[arg(long, env = "API_TOKEN", default_value = DEFAULT_API_TOKEN, hide_env_values = true)]
    api_token: String,

    /// Directory for the catalog database and scratch files
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Full scan period, e.g. 30s, 5m, 1h
    #[arg(long, env = "UPDATE_INTERVAL", default_value = "5m")]
    update_interval: String,

    /// Scratch cleanup period
    #[arg(long, env = "TEMP_CLEAN_INTERVAL", default_value = "30m")]
    temp_clean_interval: String,

    /// Randomise the backoff between retries of busy files
    #[arg(long, env = "RETRY_JITTER")]
    retry_jitter: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides --debug
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting APK Finder Server");

    let shares = ShareConfig::from_env();
    if shares.is_empty() {
        warn!("No shares configured; set FILE_SERVER_1 (and _NAME, _MOUNT)");
    }
    for share in &shares {
        info!("Share {}: {} ({})", share.id, share.display_name, share.path);
        if share.needs_mount() {
            warn!(
                "Share {} has no local mount; mount {} and set its _MOUNT variable",
                share.id, share.path
            );
        }
    }
    if args.api_token == DEFAULT_API_TOKEN {
        warn!("Using the default API token; set API_TOKEN for production");
    }

    let finder = ApkFinder::builder(&args.data_dir)
        .shares(shares)
        .update_interval(parse_interval(&args.update_interval))
        .clean_interval(parse_interval(&args.temp_clean_interval))
        .retry(RetryConfig::contention().with_jitter(args.retry_jitter))
        .build()?;
    let finder = Arc::new(finder);
    finder.start();

    let addr =
        apk_finder_server::start_server(finder.clone(), args.api_token, &args.host, args.port)
            .await?;
    info!("APK Finder API running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping scheduler");
    finder.stop();

    Ok(())
}
