use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use claim_dispatcher::client::HttpClaimClient;
use claim_dispatcher::config::{AppConfig, CONFIG_PATH};
use claim_dispatcher::dispatcher::Dispatcher;
use claim_dispatcher::logger::{self, AttemptLogger};

#[derive(Parser)]
#[command(name = "claim-dispatcher", about = "Hourly FCFS claim dispatcher")]
struct Args {
    /// Shift applied to the claimant rotation index (any integer)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    offset: i64,

    /// Path to the TOML config file
    #[arg(long, env = "CLAIM_CONFIG", default_value = CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    info!("Loaded config from {}", args.config.display());
    let settings = config.settings(args.offset)?;

    let log_path = logger::log_path(&settings.log_dir, args.offset);
    let attempt_log = AttemptLogger::spawn(&log_path).await?;
    let endpoint = HttpClaimClient::new(settings.endpoint.clone())?;

    let mut dispatcher = Dispatcher::new(settings);
    dispatcher.log_banner(&log_path);
    info!("Entering dispatch loop. Press Ctrl+C to stop.");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    dispatcher.run(&endpoint, &attempt_log, shutdown).await;

    let written = attempt_log.close().await?;
    info!("Attempt log closed ({written} record(s) this run)");
    Ok(())
}
