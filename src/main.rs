use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use sentryhive::config::Config;
use sentryhive::server;

#[derive(Parser)]
#[command(name = "sentryhive", about = "Medium-interaction SSH honeypot")]
struct Cli {
    /// Directory holding config.json, the host key, the audit database,
    /// and the per-vhost sandbox directories.
    #[arg(long, default_value = ".")]
    working_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sentryhive=info,russh=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true).with_bracketed_fields(false))
        .init();

    let working_dir = cli
        .working_dir
        .canonicalize()
        .unwrap_or(cli.working_dir.clone());
    std::fs::create_dir_all(&working_dir)
        .with_context(|| format!("failed to create working dir {}", working_dir.display()))?;

    let config = Config::load(&working_dir).context("failed to load config.json")?;

    server::run(config, &working_dir).await
}
