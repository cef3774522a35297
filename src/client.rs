use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::types::ContestedHour;

/// Connection pool size; comfortably above the largest burst.
const POOL_MAX_IDLE_PER_HOST: usize = 20;

/// JSON body of a claim request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPayload<'a> {
    pub wallet_address: &'a str,
    pub hour: ContestedHour,
}

/// Raw HTTP answer, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// The network seam used by the sender, warmer and sweep.
///
/// `Err` means no HTTP response was obtained (timeout, connect, TLS, ...).
pub trait ClaimEndpoint {
    /// Origin used for `origin`/`referer` headers.
    fn origin(&self) -> &str;

    fn post_claim(
        &self,
        payload: &ClaimPayload<'_>,
        headers: HeaderMap,
    ) -> impl Future<Output = Result<HttpReply>>;

    /// Cheap GET against the service root; only the connection matters.
    fn warm_get(&self, headers: HeaderMap) -> impl Future<Output = Result<u16>>;
}

/// Endpoint URLs and timeouts for [`HttpClaimClient`].
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub claim_url: Url,
    pub warmup_url: Url,
    pub origin: String,
    pub request_timeout: Duration,
    pub warmup_timeout: Duration,
}

/// reqwest-backed endpoint sharing one keep-alive connection pool.
pub struct HttpClaimClient {
    http: reqwest::Client,
    config: EndpointConfig,
}

impl HttpClaimClient {
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(300))
            .tcp_nodelay(true)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }
}

impl ClaimEndpoint for HttpClaimClient {
    fn origin(&self) -> &str {
        &self.config.origin
    }

    async fn post_claim(&self, payload: &ClaimPayload<'_>, headers: HeaderMap) -> Result<HttpReply> {
        let resp = self
            .http
            .post(self.config.claim_url.clone())
            .headers(headers)
            .json(payload)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(describe_transport_error)?;

        let status = resp.status().as_u16();
        // The status already reached us; a broken body is still an HTTP answer.
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Failed to read claim response body: {e}");
                format!("<unreadable body: {}>", describe_transport_error(e))
            }
        };
        Ok(HttpReply { status, body })
    }

    async fn warm_get(&self, headers: HeaderMap) -> Result<u16> {
        let resp = self
            .http
            .get(self.config.warmup_url.clone())
            .headers(headers)
            .timeout(self.config.warmup_timeout)
            .send()
            .await
            .map_err(describe_transport_error)?;
        Ok(resp.status().as_u16())
    }
}

/// Turn a reqwest error into a short, log-friendly message.
fn describe_transport_error(e: reqwest::Error) -> anyhow::Error {
    if e.is_timeout() {
        anyhow::anyhow!("timeout")
    } else if e.is_connect() {
        anyhow::anyhow!("connect: {e}")
    } else {
        anyhow::anyhow!(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_server_field_names() {
        let payload = ClaimPayload {
            wallet_address: "0xabc",
            hour: ContestedHour::new(24).unwrap(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"walletAddress": "0xabc", "hour": 24}));
    }

    #[test]
    fn client_builds() {
        let config = EndpointConfig {
            claim_url: Url::parse("https://example.org/api/claim").unwrap(),
            warmup_url: Url::parse("https://example.org/").unwrap(),
            origin: "https://example.org".into(),
            request_timeout: Duration::from_secs(2),
            warmup_timeout: Duration::from_secs(3),
        };
        let client = HttpClaimClient::new(config).unwrap();
        assert_eq!(client.origin(), "https://example.org");
    }
}
