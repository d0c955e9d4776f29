//! Chunking and extraction server binary
//!
//! Run with: cargo run -p vdr-extract --bin vdr-extract-server -- --config vdr.toml

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vdr_extract::{config::AppConfig, server::VdrServer};

#[derive(Debug, Parser)]
#[command(name = "vdr-extract-server", version, about = "PDF chunk splitting and extraction service")]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vdr_extract=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Storage: {:?} ({})", config.storage.backend, config.storage.bucket);
    tracing::info!(
        "  - Queues: {} / {}",
        config.queue.split_queue,
        config.queue.extract_queue
    );
    tracing::info!("  - Job timeout: {}s", config.queue.job_timeout_secs);
    tracing::info!("  - Job result TTL: {}s", config.queue.result_ttl_secs);
    tracing::info!("  - Max upload: {} bytes", config.server.max_upload_bytes);

    let server = VdrServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health-check", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
