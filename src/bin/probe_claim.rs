//! Probe: claim endpoint connectivity
//!
//! Checks that the configured endpoints are reachable before leaving the
//! dispatcher running:
//! - Warm-up GET against the service root (status + latency), twice, to see
//!   the effect of connection reuse
//! - One claim POST for a test claimant (status, classification, body preview)
//!
//! The claim is expected to be rejected outside the unlock window.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;

use claim_dispatcher::client::{ClaimEndpoint, ClaimPayload, HttpClaimClient};
use claim_dispatcher::config::{AppConfig, CONFIG_PATH};
use claim_dispatcher::headers::random_headers;
use claim_dispatcher::sender::classify;
use claim_dispatcher::window::contested_hour;

#[derive(Parser)]
#[command(name = "probe_claim", about = "Probe claim endpoint connectivity")]
struct Cli {
    /// Claimant to use for the test POST (defaults to the first in the pool)
    #[arg(long)]
    claimant: Option<String>,

    /// Path to the TOML config file
    #[arg(long, env = "CLAIM_CONFIG", default_value = CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;
    let settings = config.settings(0)?;
    let client = HttpClaimClient::new(settings.endpoint.clone())?;

    println!("=== Probe: claim endpoint ===");
    println!("Claim URL:   {}", settings.endpoint.claim_url);
    println!("Warm-up URL: {}", settings.endpoint.warmup_url);
    println!("UTC now:     {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    println!();

    // 1. Warm-up GETs (cold, then pooled)
    println!("--- 1. Warm-up GET ---");
    for label in ["cold", "warm"] {
        let headers = random_headers(&mut rand::rng(), client.origin());
        let start = Instant::now();
        match client.warm_get(headers).await {
            Ok(status) => println!("Status ({label}): {status} ({:?})", start.elapsed()),
            Err(e) => println!("Failed ({label}) after {:?}: {e:#}", start.elapsed()),
        }
    }
    println!();

    // 2. Claim POST
    println!("--- 2. Claim POST ---");
    let Some(claimant) = cli.claimant.or_else(|| settings.claimants.first().cloned()) else {
        println!("No claimant available (pass --claimant or fill the pool); skipping");
        return Ok(());
    };
    let hour = contested_hour(Utc::now());
    println!("Claimant: {claimant}");
    println!("Hour:     {hour}");

    let payload = ClaimPayload {
        wallet_address: &claimant,
        hour,
    };
    let headers = random_headers(&mut rand::rng(), client.origin());
    let start = Instant::now();
    match client.post_claim(&payload, headers).await {
        Ok(reply) => {
            println!("Status:   {} ({:?})", reply.status, start.elapsed());
            println!("Outcome:  {}", classify(reply.status, &reply.body).label());
            let preview: String = reply.body.chars().take(200).collect();
            println!("Body:     {preview}");
        }
        Err(e) => println!("Failed after {:?}: {e:#}", start.elapsed()),
    }

    println!();
    println!("=== Probe Complete ===");
    Ok(())
}
