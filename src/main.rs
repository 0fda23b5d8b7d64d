// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Parser;
use label_scan::{api, config::ServiceConfig, version};
use std::env;
use tracing::info;

/// Extract text and barcode/QR payloads from uploaded images
#[derive(Parser, Debug)]
#[command(name = "label-scan", version)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "LABEL_SCAN_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "LABEL_SCAN_PORT")]
    port: Option<u16>,

    /// Number of recognition workers
    #[arg(long, env = "WORKER_POOL_SIZE")]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(workers) = cli.workers {
        config.worker_pool_size = workers;
    }
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;

    info!("Starting {}", version::get_version_string());
    info!(
        bind = %config.bind_addr(),
        max_payload_bytes = config.max_payload_bytes,
        timeout_ms = config.recognition_timeout_ms,
        workers = config.worker_pool_size,
        default_mode = %config.default_mode,
        "Configuration loaded"
    );

    api::serve(config).await
}
