//! The polling loop tying the window clock to warm-ups and bursts.
//!
//! Only the dispatcher touches its markers (`attempted`, `last_warmed`,
//! `cooldown_pending`, `cooldown_until`); burst tasks never do, so no locking is needed.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};

use crate::burst::{fire_burst, pick_burst_size};
use crate::client::ClaimEndpoint;
use crate::config::DispatchSettings;
use crate::error::ConfigError;
use crate::logger::AttemptLogger;
use crate::reporter;
use crate::rotator::{abbreviate, select_claimant};
use crate::types::{BurstReport, ContestedHour, StatusEvent, WindowState};
use crate::warmer;

/// What the loop should do on this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Idle,
    Warm {
        hour: ContestedHour,
    },
    Burst {
        hour: ContestedHour,
        claimant: String,
        size: usize,
    },
    /// In the burst window, but a recent 429 asks us to hold off.
    CoolingDown {
        hour: ContestedHour,
    },
    /// In the burst window with no usable claimant or window timing.
    Misconfigured {
        hour: ContestedHour,
        error: ConfigError,
    },
}

pub struct Dispatcher {
    settings: DispatchSettings,
    attempted: HashSet<ContestedHour>,
    last_warmed: Option<ContestedHour>,
    /// Set by a rate-limited burst; armed when the next window opens.
    cooldown_pending: bool,
    cooldown_until: Option<DateTime<Utc>>,
    rng: StdRng,
}

impl Dispatcher {
    pub fn new(settings: DispatchSettings) -> Self {
        Self::with_rng(settings, StdRng::from_os_rng())
    }

    pub fn with_rng(settings: DispatchSettings, rng: StdRng) -> Self {
        Self {
            settings,
            attempted: HashSet::new(),
            last_warmed: None,
            cooldown_pending: false,
            cooldown_until: None,
            rng,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn has_attempted(&self, hour: ContestedHour) -> bool {
        self.attempted.contains(&hour)
    }

    /// Decide this tick's action and update the markers it implies.
    ///
    /// A burst's hour is marked attempted here, before the burst runs, so a
    /// later tick still inside the same window can never fire it again.
    pub fn plan(&mut self, now: DateTime<Utc>) -> Action {
        let obs = self.settings.clock.observe(now);
        match obs.state {
            WindowState::Prepare => {
                if self.settings.window_error.is_some() || self.last_warmed == Some(obs.hour) {
                    return Action::Idle;
                }
                self.last_warmed = Some(obs.hour);
                Action::Warm { hour: obs.hour }
            }
            WindowState::Burst => {
                if self.attempted.contains(&obs.hour) {
                    return Action::Idle;
                }
                if let Some(error) = &self.settings.window_error {
                    self.attempted.insert(obs.hour);
                    return Action::Misconfigured {
                        hour: obs.hour,
                        error: error.clone(),
                    };
                }
                if self.cooldown_pending {
                    self.cooldown_pending = false;
                    self.cooldown_until = Some(now + self.cooldown());
                }
                if self.cooldown_until.is_some_and(|until| now < until) {
                    return Action::CoolingDown { hour: obs.hour };
                }
                self.attempted.insert(obs.hour);
                match select_claimant(&self.settings.claimants, obs.hour, self.settings.offset) {
                    Ok(claimant) => {
                        let claimant = claimant.to_string();
                        let size = pick_burst_size(
                            &mut self.rng,
                            self.settings.burst_min,
                            self.settings.burst_max,
                        );
                        Action::Burst {
                            hour: obs.hour,
                            claimant,
                            size,
                        }
                    }
                    Err(error) => Action::Misconfigured {
                        hour: obs.hour,
                        error,
                    },
                }
            }
            WindowState::Idle => Action::Idle,
        }
    }

    /// Record what a finished burst implies for scheduling.
    ///
    /// The burst's own hour is already attempted, so a 429 delays the next
    /// hour instead: its burst starts `cooldown` after that window opens.
    pub fn note_report(&mut self, report: &BurstReport) {
        if report.rate_limited() {
            warn!(
                "Rate limited during hour {} burst; next burst waits {:?} into its window",
                report.hour, self.settings.cooldown
            );
            self.cooldown_pending = true;
        }
    }

    fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.settings.cooldown)
            .unwrap_or_else(|_| chrono::Duration::zero())
    }

    /// Sleep between ticks: short near the boundary, longer elsewhere.
    pub fn tick_interval(&self, now: DateTime<Utc>) -> Duration {
        let near_boundary = matches!(now.minute(), 59 | 0);
        if near_boundary || self.settings.clock.state(now) == WindowState::Burst {
            self.settings.burst_tick
        } else {
            self.settings.idle_tick
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Shutdown is only observed between actions: an in-flight burst always
    /// runs to completion (each request is bounded by its own timeout).
    pub async fn run<E, F>(&mut self, endpoint: &E, logger: &AttemptLogger, shutdown: F)
    where
        E: ClaimEndpoint,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let now = Utc::now();
            let action = self.plan(now);
            self.execute(endpoint, logger, action).await;

            let pause = self.tick_interval(Utc::now());
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    async fn execute<E: ClaimEndpoint>(&mut self, endpoint: &E, logger: &AttemptLogger, action: Action) {
        match action {
            Action::Idle => {}
            Action::Warm { hour } => {
                let requested = self.settings.warmup_requests;
                info!("Warming up connections for hour {hour}...");
                let ok = warmer::warm(endpoint, requested).await;
                reporter::report_event(&StatusEvent::Warmed {
                    timestamp: Utc::now().to_rfc3339(),
                    hour,
                    ok,
                    requested,
                });
            }
            Action::Burst {
                hour,
                claimant,
                size,
            } => {
                let report = fire_burst(
                    endpoint,
                    logger,
                    &claimant,
                    hour,
                    size,
                    self.settings.jitter,
                )
                .await;
                self.note_report(&report);
                reporter::report_event(&StatusEvent::from_burst(&report));
            }
            Action::CoolingDown { hour } => {
                debug!("Hour {hour} burst deferred by cooldown");
            }
            Action::Misconfigured { hour, error } => {
                error!("Skipping burst for hour {hour}: {error}");
                reporter::report_event(&StatusEvent::Misconfigured {
                    timestamp: Utc::now().to_rfc3339(),
                    hour,
                    reason: error.to_string(),
                });
            }
        }
    }

    /// Log the effective configuration once at startup.
    pub fn log_banner(&self, log_path: &std::path::Path) {
        let s = &self.settings;
        info!(
            "Dispatcher ready: policy={:?} offset={} burst={}..={} timeout={:?}",
            s.clock.policy(),
            s.offset,
            s.burst_min,
            s.burst_max,
            s.endpoint.request_timeout,
        );
        if s.claimants.is_empty() {
            error!("No claimants configured; bursts will be skipped until the pool is filled");
        } else {
            let short: Vec<String> = s.claimants.iter().map(|c| abbreviate(c)).collect();
            info!(
                "{} claimant(s) in rotation: {}",
                s.claimants.len(),
                short.join(", ")
            );
        }
        if let Some(e) = &s.window_error {
            error!("Window settings rejected ({e}); bursts are disabled until [window] is fixed");
        }
        info!("Logging attempts to {}", log_path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::sender::tests::{FakeEndpoint, read_lines, reply, temp_log};
    use crate::types::Outcome;
    use chrono::TimeZone;

    fn settings(pool: &[&str], offset: i64, policy: &str) -> DispatchSettings {
        let pool = pool
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let toml = format!(
            "[claimants]\npool = [{pool}]\n[window]\npolicy = \"{policy}\"\n[burst]\ncooldown_secs = 5\n"
        );
        AppConfig::parse(&toml).unwrap().settings(offset).unwrap()
    }

    fn dispatcher(pool: &[&str]) -> Dispatcher {
        Dispatcher::with_rng(settings(pool, 1, "reactive"), StdRng::seed_from_u64(11))
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, day, h, m, s).unwrap()
    }

    fn hour(v: u8) -> ContestedHour {
        ContestedHour::new(v).unwrap()
    }

    fn burst_hours(actions: &[Action]) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Burst { hour, .. } => Some(hour.value()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn one_burst_per_contested_hour() {
        let mut d = dispatcher(&["A", "B", "C"]);
        // Contested hours 5, 5, 6, 5 from successive ticks.
        let ticks = [at(1, 5, 0, 1), at(1, 5, 0, 3), at(1, 6, 0, 1), at(2, 5, 0, 2)];
        let actions: Vec<Action> = ticks.iter().map(|t| d.plan(*t)).collect();
        assert_eq!(burst_hours(&actions), vec![5, 6]);
        assert_eq!(actions[1], Action::Idle);
        assert_eq!(actions[3], Action::Idle);
    }

    #[test]
    fn hour_is_marked_before_the_burst_runs() {
        let mut d = dispatcher(&["A", "B", "C"]);
        let action = d.plan(at(1, 5, 0, 0));
        assert!(matches!(action, Action::Burst { .. }));
        assert!(d.has_attempted(hour(5)));
    }

    #[test]
    fn burst_uses_rotated_claimant_and_bounded_size() {
        let mut d = dispatcher(&["A", "B", "C"]);
        match d.plan(at(1, 5, 0, 0)) {
            Action::Burst {
                hour: h,
                claimant,
                size,
            } => {
                assert_eq!(h, hour(5));
                assert_eq!(claimant, "A"); // (5 + 1) mod 3 = 0
                assert!((7..=12).contains(&size));
            }
            other => panic!("expected burst, got {other:?}"),
        }
    }

    #[test]
    fn warms_once_per_prepare_window() {
        let mut d = dispatcher(&["A"]);
        assert_eq!(d.plan(at(1, 4, 59, 50)), Action::Warm { hour: hour(5) });
        assert_eq!(d.plan(at(1, 4, 59, 52)), Action::Idle);
        assert_eq!(d.plan(at(1, 4, 59, 57)), Action::Idle);
        assert_eq!(d.plan(at(1, 5, 59, 51)), Action::Warm { hour: hour(6) });
    }

    #[test]
    fn idle_outside_windows() {
        let mut d = dispatcher(&["A"]);
        assert_eq!(d.plan(at(1, 5, 30, 0)), Action::Idle);
        assert_eq!(d.plan(at(1, 5, 0, 30)), Action::Idle);
        assert!(!d.has_attempted(hour(5)));
    }

    #[test]
    fn empty_pool_reports_once_per_hour() {
        let mut d = dispatcher(&[]);
        assert!(matches!(
            d.plan(at(1, 5, 0, 0)),
            Action::Misconfigured {
                error: ConfigError::EmptyClaimantPool,
                ..
            }
        ));
        assert_eq!(d.plan(at(1, 5, 0, 1)), Action::Idle);
        assert!(matches!(d.plan(at(1, 6, 0, 0)), Action::Misconfigured { .. }));
    }

    fn rate_limited(h: u8) -> BurstReport {
        BurstReport {
            hour: hour(h),
            claimant: "A".into(),
            outcomes: vec![Outcome::NotYetUnlocked, Outcome::RateLimited],
        }
    }

    #[test]
    fn rate_limit_delays_the_next_window() {
        let mut d = dispatcher(&["A", "B"]);
        assert!(matches!(d.plan(at(1, 5, 0, 0)), Action::Burst { .. }));
        d.note_report(&rate_limited(5));
        assert_eq!(d.plan(at(1, 5, 0, 3)), Action::Idle);

        // Next window opens at 6:00:00; 5s cooldown runs from there.
        assert_eq!(d.plan(at(1, 6, 0, 0)), Action::CoolingDown { hour: hour(6) });
        assert_eq!(d.plan(at(1, 6, 0, 4)), Action::CoolingDown { hour: hour(6) });
        assert!(!d.has_attempted(hour(6)));
        assert!(matches!(d.plan(at(1, 6, 0, 5)), Action::Burst { hour: h, .. } if h == hour(6)));

        // One rate-limited burst delays one window only.
        assert!(matches!(d.plan(at(1, 7, 0, 0)), Action::Burst { .. }));
    }

    #[test]
    fn cooldown_starts_at_first_tick_in_window() {
        let mut d = dispatcher(&["A"]);
        d.note_report(&rate_limited(5));
        // Outside a window nothing is armed yet.
        assert_eq!(d.plan(at(1, 5, 30, 0)), Action::Idle);
        assert_eq!(d.plan(at(1, 6, 0, 2)), Action::CoolingDown { hour: hour(6) });
        assert_eq!(d.plan(at(1, 6, 0, 6)), Action::CoolingDown { hour: hour(6) });
        assert!(matches!(d.plan(at(1, 6, 0, 7)), Action::Burst { .. }));
    }

    #[test]
    fn unthrottled_report_sets_no_cooldown() {
        let mut d = dispatcher(&["A"]);
        d.note_report(&BurstReport {
            hour: hour(5),
            claimant: "A".into(),
            outcomes: vec![Outcome::AlreadyClaimed],
        });
        assert!(matches!(d.plan(at(1, 6, 0, 0)), Action::Burst { .. }));
    }

    #[tokio::test]
    async fn malformed_window_only_reports() {
        let toml = "[claimants]\npool = [\"A\"]\n[window]\nprepare_start_sec = 58\nprepare_end_sec = 52\n";
        let settings = AppConfig::parse(toml).unwrap().settings(0).unwrap();
        assert!(matches!(settings.window_error, Some(ConfigError::Window(_))));
        let mut d = Dispatcher::with_rng(settings, StdRng::seed_from_u64(3));

        let mut actions = Vec::new();
        let mut t = at(1, 4, 58, 0);
        while t < at(1, 6, 2, 0) {
            actions.push(d.plan(t));
            t += chrono::Duration::seconds(1);
        }
        assert!(burst_hours(&actions).is_empty());
        assert!(!actions.iter().any(|a| matches!(a, Action::Warm { .. })));
        let reported: Vec<u8> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Misconfigured {
                    hour,
                    error: ConfigError::Window(_),
                } => Some(hour.value()),
                _ => None,
            })
            .collect();
        assert_eq!(reported, vec![5, 6]);

        let path = temp_log();
        let logger = AttemptLogger::spawn(&path).await.unwrap();
        let endpoint = FakeEndpoint::always(reply(200, "Successfully claimed hour"));
        for action in actions {
            d.execute(&endpoint, &logger, action).await;
        }
        assert!(endpoint.claims.borrow().is_empty());
        assert_eq!(*endpoint.warm_calls.borrow(), 0);
        assert_eq!(logger.close().await.unwrap(), 0);
        let _ = read_lines(&path).await;
    }

    #[test]
    fn preemptive_fires_once_across_the_boundary() {
        let mut d = Dispatcher::with_rng(settings(&["A"], 0, "preemptive"), StdRng::seed_from_u64(1));
        let before = d.plan(at(1, 4, 59, 58));
        assert!(matches!(before, Action::Burst { hour: h, .. } if h == hour(5)));
        assert_eq!(d.plan(at(1, 4, 59, 59)), Action::Idle);
        assert_eq!(d.plan(at(1, 5, 0, 3)), Action::Idle);
    }

    #[test]
    fn tick_interval_adapts() {
        let d = dispatcher(&["A"]);
        assert_eq!(d.tick_interval(at(1, 5, 0, 2)), Duration::from_millis(50));
        assert_eq!(d.tick_interval(at(1, 4, 59, 40)), Duration::from_millis(50));
        assert_eq!(d.tick_interval(at(1, 5, 30, 0)), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn executes_burst_and_logs_every_attempt() {
        let path = temp_log();
        let logger = AttemptLogger::spawn(&path).await.unwrap();
        let endpoint = FakeEndpoint::always(reply(403, "not unlocked yet"));
        let mut d = dispatcher(&["A", "B", "C"]);

        let action = d.plan(at(1, 5, 0, 0));
        let size = match &action {
            Action::Burst { size, .. } => *size,
            other => panic!("expected burst, got {other:?}"),
        };
        d.execute(&endpoint, &logger, action).await;

        assert_eq!(logger.close().await.unwrap() as usize, size);
        let lines = read_lines(&path).await;
        assert_eq!(lines.len(), size);
        assert!(lines.iter().all(|l| l.contains("hour=5\twallet=A\tstatus=403")));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let path = temp_log();
        let logger = AttemptLogger::spawn(&path).await.unwrap();
        let endpoint = FakeEndpoint::always(reply(403, ""));
        let mut d = dispatcher(&["A"]);

        let shutdown = tokio::time::sleep(Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(15), d.run(&endpoint, &logger, shutdown))
            .await
            .expect("run loop should exit on shutdown");
        logger.close().await.unwrap();
        let _ = read_lines(&path).await;
    }
}
