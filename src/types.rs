use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Server-side hour label being contested (1–24; midnight UTC is 24).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContestedHour(u8);

impl ContestedHour {
    /// Build a label, rejecting anything outside 1–24.
    pub fn new(value: u8) -> Option<Self> {
        (1..=24).contains(&value).then_some(Self(value))
    }

    /// Label for a wall-clock UTC hour: midnight is 24, the rest keep their value.
    pub fn from_utc_hour(utc_hour: u32) -> Self {
        match utc_hour % 24 {
            0 => Self(24),
            h => Self(h as u8),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ContestedHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase of the hourly unlock cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Prepare,
    Burst,
    Idle,
}

/// Classified result of one claim request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Claimed,
    AlreadyClaimed,
    NotYetUnlocked,
    RateLimited,
    TransportFailure { error: String },
    OtherHttpError { status: u16 },
}

/// Coarse error taxonomy an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    ServerRejection,
    RateLimited,
    Transport,
    Http,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Claimed => OutcomeKind::Success,
            Outcome::AlreadyClaimed | Outcome::NotYetUnlocked => OutcomeKind::ServerRejection,
            Outcome::RateLimited => OutcomeKind::RateLimited,
            Outcome::TransportFailure { .. } => OutcomeKind::Transport,
            Outcome::OtherHttpError { .. } => OutcomeKind::Http,
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, Outcome::Claimed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Claimed => "claimed",
            Outcome::AlreadyClaimed => "already_claimed",
            Outcome::NotYetUnlocked => "not_yet_unlocked",
            Outcome::RateLimited => "rate_limited",
            Outcome::TransportFailure { .. } => "transport_failure",
            Outcome::OtherHttpError { .. } => "other_http_error",
        }
    }
}

/// What the server sent back, or why nothing came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptDetail {
    Body(String),
    Error(String),
}

/// One line of the attempt audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub hour: ContestedHour,
    pub claimant: String,
    /// `None` when the request never produced an HTTP response.
    pub status: Option<u16>,
    pub detail: AttemptDetail,
    /// 1-based position of the request within its burst.
    pub attempt: u32,
}

/// Aggregated result of one burst.
#[derive(Debug, Clone, Serialize)]
pub struct BurstReport {
    pub hour: ContestedHour,
    pub claimant: String,
    pub outcomes: Vec<Outcome>,
}

impl BurstReport {
    /// True iff at least one request in the burst actually claimed.
    pub fn claimed(&self) -> bool {
        self.outcomes.iter().any(Outcome::is_claimed)
    }

    pub fn rate_limited(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.kind() == OutcomeKind::RateLimited)
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind() == kind).count()
    }
}

/// Console status event, one JSON line per event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    Warmed {
        timestamp: String,
        hour: ContestedHour,
        ok: usize,
        requested: usize,
    },
    Burst {
        timestamp: String,
        hour: ContestedHour,
        claimant: String,
        size: usize,
        claimed: bool,
        rejected: usize,
        rate_limited: usize,
        transport_failures: usize,
        http_errors: usize,
    },
    Misconfigured {
        timestamp: String,
        hour: ContestedHour,
        reason: String,
    },
}

impl StatusEvent {
    pub fn from_burst(report: &BurstReport) -> Self {
        StatusEvent::Burst {
            timestamp: Utc::now().to_rfc3339(),
            hour: report.hour,
            claimant: report.claimant.clone(),
            size: report.outcomes.len(),
            claimed: report.claimed(),
            rejected: report.count(OutcomeKind::ServerRejection),
            rate_limited: report.count(OutcomeKind::RateLimited),
            transport_failures: report.count(OutcomeKind::Transport),
            http_errors: report.count(OutcomeKind::Http),
        }
    }
}

/// Totals of a manual sweep run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub claimed: Vec<String>,
    pub already_claimed: Vec<String>,
    pub not_unlocked: Vec<String>,
    pub errors: Vec<String>,
    pub total_attempts: u64,
}
