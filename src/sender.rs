use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info};

use crate::CLAIM_SUCCESS_MARKER;
use crate::client::{ClaimEndpoint, ClaimPayload};
use crate::headers::random_headers;
use crate::logger::AttemptLogger;
use crate::types::{AttemptDetail, AttemptRecord, ContestedHour, Outcome};

/// Classify an HTTP answer. A 200 alone is not a claim: the body must say so.
pub fn classify(status: u16, body: &str) -> Outcome {
    match status {
        200 if body.contains(CLAIM_SUCCESS_MARKER) => Outcome::Claimed,
        409 => Outcome::AlreadyClaimed,
        403 => Outcome::NotYetUnlocked,
        429 => Outcome::RateLimited,
        other => Outcome::OtherHttpError { status: other },
    }
}

/// Send one claim request and log it.
///
/// Sleeps a random `0..=jitter` first. Never fails: every error path ends up
/// as a classified [`Outcome`] and an attempt record.
pub async fn send_claim<E: ClaimEndpoint>(
    endpoint: &E,
    logger: &AttemptLogger,
    claimant: &str,
    hour: ContestedHour,
    attempt: u32,
    jitter: Duration,
) -> Outcome {
    // Draw everything random up front; ThreadRng must not live across awaits.
    let (delay, headers) = {
        let mut rng = rand::rng();
        let max_ms = jitter.as_millis() as u64;
        let delay = Duration::from_millis(if max_ms == 0 { 0 } else { rng.random_range(0..=max_ms) });
        (delay, random_headers(&mut rng, endpoint.origin()))
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let payload = ClaimPayload {
        wallet_address: claimant,
        hour,
    };
    let timestamp = Utc::now();

    let (outcome, status, detail) = match endpoint.post_claim(&payload, headers).await {
        Ok(reply) => {
            let outcome = classify(reply.status, &reply.body);
            (outcome, Some(reply.status), AttemptDetail::Body(reply.body))
        }
        Err(e) => {
            let error = format!("{e:#}");
            (
                Outcome::TransportFailure {
                    error: error.clone(),
                },
                None,
                AttemptDetail::Error(error),
            )
        }
    };

    logger.record(&AttemptRecord {
        timestamp,
        hour,
        claimant: claimant.to_string(),
        status,
        detail,
        attempt,
    });

    if outcome.is_claimed() {
        info!("Hour {hour} claimed by {claimant} (attempt {attempt})");
    } else {
        debug!(
            "Hour {hour} attempt {attempt}: {} (status {:?})",
            outcome.label(),
            status
        );
    }
    outcome
}
