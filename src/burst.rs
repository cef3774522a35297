use std::time::Duration;

use futures_util::future::join_all;
use rand::Rng;
use tracing::info;

use crate::client::ClaimEndpoint;
use crate::logger::AttemptLogger;
use crate::rotator::abbreviate;
use crate::sender::send_claim;
use crate::types::{BurstReport, ContestedHour};

/// Gap between consecutive request launches within a burst.
pub const LAUNCH_STAGGER: Duration = Duration::from_millis(1);

/// Draw a burst size uniformly from `min..=max`.
pub fn pick_burst_size<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize) -> usize {
    if min >= max {
        return min;
    }
    rng.random_range(min..=max)
}

/// Fire `size` concurrent claim requests for one hour and collect every outcome.
///
/// Request `i` starts `i` stagger steps after the first. All requests run to
/// completion (each bounded by the endpoint's own timeout); a success does
/// not cancel its siblings, and one request's failure cannot abort another.
pub async fn fire_burst<E: ClaimEndpoint>(
    endpoint: &E,
    logger: &AttemptLogger,
    claimant: &str,
    hour: ContestedHour,
    size: usize,
    jitter: Duration,
) -> BurstReport {
    info!(
        "Burst: hour {hour}, claimant {}, {size} request(s)",
        abbreviate(claimant)
    );

    let requests = (0..size).map(|i| async move {
        let launch_at = LAUNCH_STAGGER * i as u32;
        if !launch_at.is_zero() {
            tokio::time::sleep(launch_at).await;
        }
        send_claim(endpoint, logger, claimant, hour, i as u32 + 1, jitter).await
    });
    let outcomes = join_all(requests).await;

    let report = BurstReport {
        hour,
        claimant: claimant.to_string(),
        outcomes,
    };
    if report.claimed() {
        info!("Burst for hour {hour} succeeded");
    } else {
        info!("Burst for hour {hour} finished without a claim");
    }
    report
}
