//! Hourly unlock window detection.
//!
//! Everything here is a pure function of a UTC timestamp: the same instant
//! always maps to the same `(WindowState, ContestedHour)` pair.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ContestedHour, WindowState};

/// When to fire relative to the hour boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurstPolicy {
    /// Fire just after the boundary, once the hour is unlocked.
    Reactive,
    /// Start firing a few seconds before the boundary and keep going
    /// shortly after it, relying on FCFS queuing on the server.
    Preemptive,
}

/// Second offsets that shape the PREPARE and BURST windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTiming {
    /// First second of minute 59 that counts as PREPARE.
    pub prepare_start_sec: u32,
    /// Last second of minute 59 that counts as PREPARE.
    pub prepare_end_sec: u32,
    /// Seconds before the boundary included in BURST (preemptive only).
    pub pre_boundary_secs: u32,
    /// Last second of minute 0 included in BURST.
    pub post_boundary_secs: u32,
}

impl WindowTiming {
    pub const REACTIVE: Self = Self {
        prepare_start_sec: 50,
        prepare_end_sec: 57,
        pre_boundary_secs: 0,
        post_boundary_secs: 8,
    };

    pub const PREEMPTIVE: Self = Self {
        prepare_start_sec: 50,
        prepare_end_sec: 57,
        pre_boundary_secs: 2,
        post_boundary_secs: 10,
    };

    pub fn default_for(policy: BurstPolicy) -> Self {
        match policy {
            BurstPolicy::Reactive => Self::REACTIVE,
            BurstPolicy::Preemptive => Self::PREEMPTIVE,
        }
    }
}

/// Map a wall-clock UTC hour (0–23) to the server's 1–24 label.
pub fn server_hour_label(utc_hour: u32) -> ContestedHour {
    ContestedHour::from_utc_hour(utc_hour)
}

/// The hour whose unlock boundary is nearest ahead (minute 59) or most
/// recently passed (any other minute).
pub fn contested_hour(now: DateTime<Utc>) -> ContestedHour {
    if now.minute() == 59 {
        server_hour_label(now.hour() + 1)
    } else {
        server_hour_label(now.hour())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub state: WindowState,
    pub hour: ContestedHour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowClock {
    policy: BurstPolicy,
    timing: WindowTiming,
}

impl WindowClock {
    /// Validate the timing against the policy.
    ///
    /// PREPARE must sit strictly before BURST inside minute 59, so a tick
    /// sequence across one boundary always reads PREPARE → BURST → IDLE.
    pub fn new(policy: BurstPolicy, timing: WindowTiming) -> Result<Self, ConfigError> {
        let WindowTiming {
            prepare_start_sec,
            prepare_end_sec,
            pre_boundary_secs,
            post_boundary_secs,
        } = timing;

        if prepare_start_sec > 59 || prepare_end_sec > 59 {
            return Err(ConfigError::Window(format!(
                "prepare seconds must be within 0-59 (got {prepare_start_sec}-{prepare_end_sec})"
            )));
        }
        if prepare_start_sec > prepare_end_sec {
            return Err(ConfigError::Window(format!(
                "prepare_start_sec ({prepare_start_sec}) is after prepare_end_sec ({prepare_end_sec})"
            )));
        }
        if post_boundary_secs > 59 {
            return Err(ConfigError::Window(format!(
                "post_boundary_secs must be within 0-59 (got {post_boundary_secs})"
            )));
        }
        if policy == BurstPolicy::Preemptive {
            if pre_boundary_secs == 0 || pre_boundary_secs > 59 {
                return Err(ConfigError::Window(format!(
                    "preemptive policy needs pre_boundary_secs within 1-59 (got {pre_boundary_secs})"
                )));
            }
            let burst_start = 60 - pre_boundary_secs;
            if prepare_end_sec >= burst_start {
                return Err(ConfigError::Window(format!(
                    "prepare window (ends :59:{prepare_end_sec:02}) overlaps burst window (starts :59:{burst_start:02})"
                )));
            }
        }

        Ok(Self { policy, timing })
    }

    /// The policy's reference timing, which always validates.
    pub fn reference(policy: BurstPolicy) -> Self {
        Self {
            policy,
            timing: WindowTiming::default_for(policy),
        }
    }

    /// Length of the BURST window in whole seconds.
    pub fn burst_secs(&self) -> u32 {
        let lead = match self.policy {
            BurstPolicy::Preemptive => self.timing.pre_boundary_secs,
            BurstPolicy::Reactive => 0,
        };
        lead + self.timing.post_boundary_secs + 1
    }

    pub fn policy(&self) -> BurstPolicy {
        self.policy
    }

    pub fn timing(&self) -> WindowTiming {
        self.timing
    }

    pub fn state(&self, now: DateTime<Utc>) -> WindowState {
        let (m, s) = (now.minute(), now.second());
        let t = &self.timing;

        let after_boundary = m == 0 && s <= t.post_boundary_secs;
        let before_boundary = self.policy == BurstPolicy::Preemptive
            && m == 59
            && s >= 60 - t.pre_boundary_secs;

        if after_boundary || before_boundary {
            WindowState::Burst
        } else if m == 59 && (t.prepare_start_sec..=t.prepare_end_sec).contains(&s) {
            WindowState::Prepare
        } else {
            WindowState::Idle
        }
    }

    pub fn observe(&self, now: DateTime<Utc>) -> Observation {
        Observation {
            state: self.state(now),
            hour: contested_hour(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 1, h, m, s).unwrap()
    }

    fn reactive() -> WindowClock {
        WindowClock::new(BurstPolicy::Reactive, WindowTiming::REACTIVE).unwrap()
    }

    fn preemptive() -> WindowClock {
        WindowClock::new(BurstPolicy::Preemptive, WindowTiming::PREEMPTIVE).unwrap()
    }

    fn label(v: u8) -> ContestedHour {
        ContestedHour::new(v).unwrap()
    }

    // ── server_hour_label ─────────────────────────────────────────

    #[test]
    fn midnight_maps_to_24() {
        assert_eq!(server_hour_label(0), label(24));
        assert_eq!(server_hour_label(24), label(24));
    }

    #[test]
    fn other_hours_keep_wall_clock_value() {
        for h in 1..24 {
            assert_eq!(server_hour_label(h).value() as u32, h);
        }
    }

    #[test]
    fn minute_59_contests_next_hour() {
        assert_eq!(contested_hour(at(4, 59, 55)), label(5));
        assert_eq!(contested_hour(at(23, 59, 58)), label(24));
        assert_eq!(contested_hour(at(0, 0, 3)), label(24));
        assert_eq!(contested_hour(at(5, 30, 0)), label(5));
    }

    // ── reactive ──────────────────────────────────────────────────

    #[test]
    fn reactive_windows() {
        let clock = reactive();
        assert_eq!(clock.state(at(4, 59, 49)), WindowState::Idle);
        assert_eq!(clock.state(at(4, 59, 50)), WindowState::Prepare);
        assert_eq!(clock.state(at(4, 59, 57)), WindowState::Prepare);
        assert_eq!(clock.state(at(4, 59, 58)), WindowState::Idle);
        assert_eq!(clock.state(at(5, 0, 0)), WindowState::Burst);
        assert_eq!(clock.state(at(5, 0, 8)), WindowState::Burst);
        assert_eq!(clock.state(at(5, 0, 9)), WindowState::Idle);
        assert_eq!(clock.state(at(5, 1, 0)), WindowState::Idle);
    }

    #[test]
    fn reactive_burst_targets_just_unlocked_hour() {
        let obs = reactive().observe(at(5, 0, 2));
        assert_eq!(obs.state, WindowState::Burst);
        assert_eq!(obs.hour, label(5));
    }

    // ── preemptive ────────────────────────────────────────────────

    #[test]
    fn preemptive_windows() {
        let clock = preemptive();
        assert_eq!(clock.state(at(4, 59, 57)), WindowState::Prepare);
        assert_eq!(clock.state(at(4, 59, 58)), WindowState::Burst);
        assert_eq!(clock.state(at(4, 59, 59)), WindowState::Burst);
        assert_eq!(clock.state(at(5, 0, 10)), WindowState::Burst);
        assert_eq!(clock.state(at(5, 0, 11)), WindowState::Idle);
    }

    #[test]
    fn preemptive_burst_keeps_one_hour_across_boundary() {
        let clock = preemptive();
        let before = clock.observe(at(4, 59, 58));
        let after = clock.observe(at(5, 0, 1));
        assert_eq!(before.state, WindowState::Burst);
        assert_eq!(after.state, WindowState::Burst);
        assert_eq!(before.hour, label(5));
        assert_eq!(after.hour, label(5));
    }

    #[test]
    fn preemptive_midnight_wrap() {
        let clock = preemptive();
        assert_eq!(clock.observe(at(23, 59, 59)).hour, label(24));
        let next_day = Utc.with_ymd_and_hms(2025, 12, 2, 0, 0, 4).unwrap();
        assert_eq!(clock.observe(next_day).hour, label(24));
    }

    // ── properties ────────────────────────────────────────────────

    #[test]
    fn observe_is_pure() {
        let clock = preemptive();
        let t = at(11, 59, 59) + Duration::milliseconds(250);
        assert_eq!(clock.observe(t), clock.observe(t));
    }

    #[test]
    fn boundary_crossing_never_regresses() {
        for clock in [reactive(), preemptive()] {
            // From the start of PREPARE to well past the burst, in 100ms steps.
            let mut t = at(7, 59, 50);
            let end = at(8, 0, 30);
            let mut seen_burst = false;
            let mut burst_over = false;
            while t <= end {
                match clock.state(t) {
                    WindowState::Prepare => {
                        assert!(!seen_burst, "{:?}: PREPARE after BURST at {t}", clock.policy());
                    }
                    WindowState::Burst => {
                        assert!(!burst_over, "{:?}: BURST reopened at {t}", clock.policy());
                        seen_burst = true;
                    }
                    WindowState::Idle => burst_over |= seen_burst,
                }
                t += Duration::milliseconds(100);
            }
            assert!(seen_burst && burst_over);
        }
    }

    // ── validation ────────────────────────────────────────────────

    #[test]
    fn rejects_inverted_prepare() {
        let timing = WindowTiming {
            prepare_start_sec: 57,
            prepare_end_sec: 50,
            ..WindowTiming::REACTIVE
        };
        assert!(matches!(
            WindowClock::new(BurstPolicy::Reactive, timing),
            Err(ConfigError::Window(_))
        ));
    }

    #[test]
    fn rejects_prepare_overlapping_preemptive_burst() {
        let timing = WindowTiming {
            prepare_end_sec: 58,
            ..WindowTiming::PREEMPTIVE
        };
        assert!(WindowClock::new(BurstPolicy::Preemptive, timing).is_err());
    }

    #[test]
    fn rejects_preemptive_without_lead() {
        let timing = WindowTiming {
            pre_boundary_secs: 0,
            ..WindowTiming::PREEMPTIVE
        };
        assert!(WindowClock::new(BurstPolicy::Preemptive, timing).is_err());
    }

    #[test]
    fn rejects_out_of_range_seconds() {
        let timing = WindowTiming {
            post_boundary_secs: 60,
            ..WindowTiming::REACTIVE
        };
        assert!(WindowClock::new(BurstPolicy::Reactive, timing).is_err());
    }

    #[test]
    fn burst_length_counts_both_sides_of_the_boundary() {
        assert_eq!(reactive().burst_secs(), 9);
        assert_eq!(preemptive().burst_secs(), 13);
        assert_eq!(WindowClock::reference(BurstPolicy::Preemptive), preemptive());
    }

    #[test]
    fn policy_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrap {
            policy: BurstPolicy,
        }
        let w: Wrap = toml::from_str("policy = \"preemptive\"").unwrap();
        assert_eq!(w.policy, BurstPolicy::Preemptive);
    }
}
