use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::EndpointConfig;
use crate::error::ConfigError;
use crate::window::{BurstPolicy, WindowClock, WindowTiming};
use crate::{DEFAULT_CLAIM_URL, DEFAULT_ORIGIN, DEFAULT_WARMUP_URL};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub endpoint: EndpointSection,
    pub claimants: ClaimantsSection,
    #[serde(default)]
    pub burst: BurstSection,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub warmup: WarmupSection,
    #[serde(default)]
    pub settings: SettingsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSection {
    #[serde(default = "default_claim_url")]
    pub claim_url: String,
    #[serde(default = "default_warmup_url")]
    pub warmup_url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
}

/// Claimant identities, in rotation order. Blank entries are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimantsSection {
    #[serde(default)]
    pub pool: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstSection {
    /// Smallest number of concurrent requests per burst.
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    /// Largest number of concurrent requests per burst.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Upper bound of the random pre-send delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Pause after a rate-limited burst before another may start.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSection {
    #[serde(default = "default_policy")]
    pub policy: BurstPolicy,
    /// Unset fields fall back to the policy's reference timing.
    pub prepare_start_sec: Option<u32>,
    pub prepare_end_sec: Option<u32>,
    pub pre_boundary_secs: Option<u32>,
    pub post_boundary_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupSection {
    #[serde(default = "default_warmup_requests")]
    pub requests: usize,
    #[serde(default = "default_warmup_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSection {
    /// Poll interval outside the burst window.
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,
    /// Poll interval inside the burst window.
    #[serde(default = "default_burst_tick_ms")]
    pub burst_tick_ms: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_claim_url() -> String {
    DEFAULT_CLAIM_URL.to_string()
}

fn default_warmup_url() -> String {
    DEFAULT_WARMUP_URL.to_string()
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_min_size() -> usize {
    7
}

fn default_max_size() -> usize {
    12
}

fn default_jitter_ms() -> u64 {
    50
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_cooldown_secs() -> u64 {
    5
}

fn default_policy() -> BurstPolicy {
    BurstPolicy::Reactive
}

fn default_warmup_requests() -> usize {
    3
}

fn default_warmup_timeout_ms() -> u64 {
    3000
}

fn default_idle_tick_ms() -> u64 {
    100
}

fn default_burst_tick_ms() -> u64 {
    50
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            claim_url: default_claim_url(),
            warmup_url: default_warmup_url(),
            origin: default_origin(),
        }
    }
}

impl Default for BurstSection {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            jitter_ms: default_jitter_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            prepare_start_sec: None,
            prepare_end_sec: None,
            pre_boundary_secs: None,
            post_boundary_secs: None,
        }
    }
}

impl Default for WarmupSection {
    fn default() -> Self {
        Self {
            requests: default_warmup_requests(),
            timeout_ms: default_warmup_timeout_ms(),
        }
    }
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            idle_tick_ms: default_idle_tick_ms(),
            burst_tick_ms: default_burst_tick_ms(),
            log_dir: default_log_dir(),
        }
    }
}

/// Validated, immutable inputs for one dispatcher run.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub endpoint: EndpointConfig,
    /// Non-empty, trimmed identities. May itself be empty; the dispatcher
    /// then idles with a diagnostic instead of bursting.
    pub claimants: Vec<String>,
    pub offset: i64,
    /// Paces the loop. When `[window]` is malformed this is the policy's
    /// reference timing and `window_error` holds the reason; no burst is
    /// fired in that case, the dispatcher only reports the error.
    pub clock: WindowClock,
    pub window_error: Option<ConfigError>,
    pub burst_min: usize,
    pub burst_max: usize,
    pub jitter: Duration,
    pub cooldown: Duration,
    pub warmup_requests: usize,
    pub idle_tick: Duration,
    pub burst_tick: Duration,
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    /// Claimant pool with blank entries dropped.
    pub fn configured_claimants(&self) -> Vec<String> {
        self.claimants
            .pool
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Build the window clock from `[window]`, filling unset fields from the
    /// policy's reference timing.
    pub fn window_clock(&self) -> Result<WindowClock, ConfigError> {
        let window = &self.window;
        let reference = WindowTiming::default_for(window.policy);
        let pre_boundary_secs = window
            .pre_boundary_secs
            .unwrap_or(reference.pre_boundary_secs);
        // An unset prepare end gives way to a longer pre-boundary burst.
        let prepare_end_sec = window.prepare_end_sec.unwrap_or(match window.policy {
            BurstPolicy::Preemptive => reference
                .prepare_end_sec
                .min(59u32.saturating_sub(pre_boundary_secs)),
            BurstPolicy::Reactive => reference.prepare_end_sec,
        });
        let timing = WindowTiming {
            prepare_start_sec: window
                .prepare_start_sec
                .unwrap_or(reference.prepare_start_sec),
            prepare_end_sec,
            pre_boundary_secs,
            post_boundary_secs: window
                .post_boundary_secs
                .unwrap_or(reference.post_boundary_secs),
        };
        WindowClock::new(window.policy, timing)
    }

    /// Validate everything and freeze it into [`DispatchSettings`].
    pub fn settings(&self, offset: i64) -> Result<DispatchSettings, ConfigError> {
        let claim_url = parse_url("claim_url", &self.endpoint.claim_url)?;
        let warmup_url = parse_url("warmup_url", &self.endpoint.warmup_url)?;
        parse_url("origin", &self.endpoint.origin)?;

        let burst = &self.burst;
        if burst.min_size == 0 {
            return Err(ConfigError::Burst("min_size must be at least 1".into()));
        }
        if burst.min_size > burst.max_size {
            return Err(ConfigError::Burst(format!(
                "min_size ({}) exceeds max_size ({})",
                burst.min_size, burst.max_size
            )));
        }
        if burst.request_timeout_ms == 0 {
            return Err(ConfigError::Burst("request_timeout_ms must be positive".into()));
        }
        if self.warmup.requests == 0 || self.warmup.requests > 3 {
            return Err(ConfigError::Burst(format!(
                "warmup.requests must be between 1 and 3 (got {})",
                self.warmup.requests
            )));
        }

        let (clock, window_error) = match self.window_clock() {
            Ok(clock) => (clock, None),
            Err(e) => (WindowClock::reference(self.window.policy), Some(e)),
        };
        let burst_secs = clock.burst_secs();
        if burst.cooldown_secs >= u64::from(burst_secs) {
            return Err(ConfigError::Burst(format!(
                "cooldown_secs ({}) must be shorter than the {burst_secs}s burst window",
                burst.cooldown_secs
            )));
        }

        Ok(DispatchSettings {
            endpoint: EndpointConfig {
                claim_url,
                warmup_url,
                origin: self.endpoint.origin.trim_end_matches('/').to_string(),
                request_timeout: Duration::from_millis(burst.request_timeout_ms),
                warmup_timeout: Duration::from_millis(self.warmup.timeout_ms),
            },
            claimants: self.configured_claimants(),
            offset,
            clock,
            window_error,
            burst_min: burst.min_size,
            burst_max: burst.max_size,
            jitter: Duration::from_millis(burst.jitter_ms),
            cooldown: Duration::from_secs(burst.cooldown_secs),
            warmup_requests: self.warmup.requests,
            idle_tick: Duration::from_millis(self.settings.idle_tick_ms.max(1)),
            burst_tick: Duration::from_millis(self.settings.burst_tick_ms.max(1)),
            log_dir: self.settings.log_dir.clone(),
        })
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Endpoint {
        field,
        reason: format!("{raw}: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Endpoint {
            field,
            reason: format!("unsupported scheme {other}"),
        }),
    }
}
