use futures_util::future::join_all;
use tracing::debug;

use crate::client::ClaimEndpoint;
use crate::headers::random_headers;

/// Warm the shared connection pool with `count` concurrent GETs.
///
/// Best-effort: failures are only logged at debug level. Returns how many
/// GETs got any HTTP answer.
pub async fn warm<E: ClaimEndpoint>(endpoint: &E, count: usize) -> usize {
    let requests = (0..count).map(|_| {
        let headers = random_headers(&mut rand::rng(), endpoint.origin());
        endpoint.warm_get(headers)
    });

    join_all(requests)
        .await
        .into_iter()
        .filter(|result| match result {
            Ok(status) => {
                debug!("Warm-up GET answered {status}");
                true
            }
            Err(e) => {
                debug!("Warm-up GET failed: {e:#}");
                false
            }
        })
        .count()
}
