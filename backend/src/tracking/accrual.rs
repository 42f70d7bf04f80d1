//! Heartbeat accrual rules: which instant elapsed time is measured from and
//! which deltas count as worked time.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::config::{TrackingConfig, MAX_WINDOW_SECS};

const DEFAULT_MAX_GAP_SECS: i64 = 5 * 60;

/// Bounds a heartbeat delta must fall within to be accrued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualPolicy {
    /// Exclusive upper bound on the time between two heartbeats.
    pub max_gap: Duration,
}

impl Default for AccrualPolicy {
    fn default() -> Self {
        Self {
            max_gap: Duration::seconds(DEFAULT_MAX_GAP_SECS),
        }
    }
}

impl From<&TrackingConfig> for AccrualPolicy {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            max_gap: Duration::seconds(config.max_heartbeat_gap_secs.min(MAX_WINDOW_SECS) as i64),
        }
    }
}

/// Why a heartbeat added no hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Neither an activity timestamp nor a sign-in is known.
    NoAnchor,
    /// The anchor is at or after `now` (clock skew or duplicate request).
    NonPositive,
    /// Too long since the anchor; the user was away.
    GapTooLarge,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoAnchor => "no_anchor",
            SkipReason::NonPositive => "non_positive",
            SkipReason::GapTooLarge => "gap_too_large",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one heartbeat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accrual {
    Accepted { hours: f64 },
    Skipped(SkipReason),
}

impl Accrual {
    pub fn hours(&self) -> f64 {
        match self {
            Accrual::Accepted { hours } => *hours,
            Accrual::Skipped(_) => 0.0,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Accrual::Accepted { .. } => None,
            Accrual::Skipped(reason) => Some(*reason),
        }
    }
}

/// The later of the two instants; absent values are ignored.
pub fn select_anchor(
    last_active: Option<DateTime<Utc>>,
    last_sign_in: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (last_active, last_sign_in) {
        (Some(a), Some(s)) => Some(a.max(s)),
        (a, s) => a.or(s),
    }
}

/// Duration expressed as fractional hours.
pub fn duration_to_hours(d: Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / 3_600_000_000.0,
        None => d.num_seconds() as f64 / 3_600.0,
    }
}

/// UTC day a heartbeat at `now` is bucketed into.
pub fn work_date(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

impl AccrualPolicy {
    pub fn new(max_gap: Duration) -> Self {
        Self { max_gap }
    }

    /// Accept `now - anchor` if it lies strictly between zero and `max_gap`.
    pub fn evaluate(&self, anchor: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Accrual {
        let Some(anchor) = anchor else {
            return Accrual::Skipped(SkipReason::NoAnchor);
        };

        let delta = now - anchor;
        if delta <= Duration::zero() {
            Accrual::Skipped(SkipReason::NonPositive)
        } else if delta >= self.max_gap {
            Accrual::Skipped(SkipReason::GapTooLarge)
        } else {
            Accrual::Accepted {
                hours: duration_to_hours(delta),
            }
        }
    }
}
