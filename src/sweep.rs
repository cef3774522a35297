//! Manual sweep over hours that are already unlocked.
//!
//! Unlike a burst this is strictly sequential: one request at a time, every
//! claimant against every hour in the range, with a pause in between.

use std::time::Duration;

use tracing::{info, warn};

use crate::client::ClaimEndpoint;
use crate::logger::AttemptLogger;
use crate::rotator::abbreviate;
use crate::sender::send_claim;
use crate::types::{ContestedHour, Outcome, SweepSummary};

/// Pause between consecutive sweep requests.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(500);

/// Extra pause after a 429.
pub const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub first: ContestedHour,
    pub last: ContestedHour,
    pub pause: Duration,
    pub rate_limit_pause: Duration,
}

impl SweepPlan {
    pub fn new(first: ContestedHour, last: ContestedHour) -> Self {
        Self {
            first,
            last,
            pause: DEFAULT_PAUSE,
            rate_limit_pause: RATE_LIMIT_PAUSE,
        }
    }

    fn hours(&self) -> impl Iterator<Item = ContestedHour> {
        (self.first.value()..=self.last.value()).filter_map(ContestedHour::new)
    }
}

pub async fn sweep<E: ClaimEndpoint>(
    endpoint: &E,
    logger: &AttemptLogger,
    claimants: &[String],
    plan: &SweepPlan,
) -> SweepSummary {
    let mut summary = SweepSummary::default();
    let total = plan.hours().count() * claimants.len();
    let mut done = 0usize;

    for hour in plan.hours() {
        info!("Sweeping hour {hour}...");
        for (idx, claimant) in claimants.iter().enumerate() {
            let tag = format!("hour {hour} claimant #{} ({})", idx + 1, abbreviate(claimant));
            let outcome = send_claim(endpoint, logger, claimant, hour, idx as u32 + 1, Duration::ZERO).await;
            summary.total_attempts += 1;
            done += 1;

            match &outcome {
                Outcome::Claimed => {
                    info!("{tag}: claimed");
                    summary.claimed.push(tag);
                }
                Outcome::AlreadyClaimed => {
                    info!("{tag}: already claimed");
                    summary.already_claimed.push(tag);
                }
                Outcome::NotYetUnlocked => {
                    info!("{tag}: not unlocked yet");
                    summary.not_unlocked.push(tag);
                }
                Outcome::RateLimited => {
                    warn!("{tag}: rate limited, pausing {:?}", plan.rate_limit_pause);
                    summary.errors.push(format!("{tag}: rate limited"));
                    tokio::time::sleep(plan.rate_limit_pause).await;
                }
                Outcome::TransportFailure { error } => {
                    warn!("{tag}: {error}");
                    summary.errors.push(format!("{tag}: {error}"));
                }
                Outcome::OtherHttpError { status } => {
                    warn!("{tag}: unexpected status {status}");
                    summary.errors.push(format!("{tag}: status {status}"));
                }
            }

            if done < total {
                tokio::time::sleep(plan.pause).await;
            }
        }
    }

    summary
}
