//! claim-sweep: claim hours that are already unlocked.
//!
//! Walks every configured claimant through every hour in `--from..=--to`,
//! one request at a time, and prints a JSON summary at the end. Attempts go
//! to the same audit log format as the dispatcher (`claim_log_sweep.txt`).

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;

use claim_dispatcher::client::HttpClaimClient;
use claim_dispatcher::config::{AppConfig, CONFIG_PATH};
use claim_dispatcher::logger::AttemptLogger;
use claim_dispatcher::reporter;
use claim_dispatcher::sweep::{SweepPlan, sweep};
use claim_dispatcher::types::ContestedHour;

#[derive(Parser)]
#[command(name = "claim-sweep", about = "Sequentially claim already-unlocked hours")]
struct Cli {
    /// First hour label to try (1-24)
    #[arg(long)]
    from: u8,

    /// Last hour label to try (1-24)
    #[arg(long)]
    to: u8,

    /// Pause between requests in milliseconds
    #[arg(long, default_value_t = 500)]
    pause_ms: u64,

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

    let cli = Cli::parse();
    let (Some(first), Some(last)) = (ContestedHour::new(cli.from), ContestedHour::new(cli.to))
    else {
        bail!("--from and --to must be hour labels between 1 and 24");
    };
    if first > last {
        bail!("--from ({first}) must not be after --to ({last})");
    }

    let config = AppConfig::load(&cli.config)?;
    let settings = config.settings(0)?;
    if settings.claimants.is_empty() {
        bail!("no claimants configured in {}", cli.config.display());
    }

    let log_path = settings.log_dir.join("claim_log_sweep.txt");
    let attempt_log = AttemptLogger::spawn(&log_path).await?;
    let endpoint = HttpClaimClient::new(settings.endpoint.clone())?;

    let plan = SweepPlan {
        pause: std::time::Duration::from_millis(cli.pause_ms),
        ..SweepPlan::new(first, last)
    };
    info!(
        "Sweeping hours {first}..={last} with {} claimant(s); logging to {}",
        settings.claimants.len(),
        log_path.display()
    );

    let summary = sweep(&endpoint, &attempt_log, &settings.claimants, &plan).await;
    attempt_log.close().await?;
    reporter::report_sweep_summary(&summary);
    Ok(())
}
