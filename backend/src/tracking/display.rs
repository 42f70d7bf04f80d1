//! Rendering of accrued time for the dashboards. Everything here is pure.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use backoffice_common::TimeFilter;

use crate::models::user::UserWithHours;

use super::accrual::duration_to_hours;

/// Whether the work-log day `date` falls inside `filter` as seen at `now`.
pub fn window_contains(filter: TimeFilter, date: NaiveDate, now: DateTime<Utc>) -> bool {
    let today = now.date_naive();
    match filter {
        TimeFilter::Today => date == today,
        TimeFilter::Week => {
            let start = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
            date >= start && date < start + Duration::days(7)
        }
        TimeFilter::Month => date.year() == today.year() && date.month() == today.month(),
        TimeFilter::All => true,
    }
}

/// Hours logged inside the filter window.
///
/// `All` returns `total_hours` directly. Keys that are not `YYYY-MM-DD` are
/// ignored.
pub fn baseline_hours(
    work_log: &BTreeMap<String, f64>,
    total_hours: f64,
    filter: TimeFilter,
    now: DateTime<Utc>,
) -> f64 {
    if filter == TimeFilter::All {
        return total_hours;
    }
    work_log
        .iter()
        .filter_map(|(key, hours)| {
            NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .ok()
                .filter(|date| window_contains(filter, *date, now))
                .map(|_| *hours)
        })
        .sum()
}

/// Hours since `anchor`, never negative and with no upper bound.
pub fn live_hours(anchor: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match anchor {
        Some(anchor) => duration_to_hours(now - anchor).max(0.0),
        None => 0.0,
    }
}

/// `HH:MM:SS` for a number of hours; hours are at least two digits.
pub fn format_hms(hours: f64) -> String {
    if !hours.is_finite() || hours <= 0.0 {
        return "00:00:00".to_string();
    }
    // Round to the millisecond first so 3.6666.. hours renders as 03:40:00
    let millis = (hours * 3_600_000.0).round() as u64;
    let total_secs = millis / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

/// Elapsed-time string shown next to a user: baseline for the window plus,
/// while online, the live time since the anchor.
pub fn display_elapsed(
    user: &UserWithHours,
    filter: TimeFilter,
    is_online: bool,
    now: DateTime<Utc>,
) -> String {
    let mut hours = baseline_hours(&user.work_log, user.total_hours, filter, now);
    if is_online {
        hours += live_hours(user.user.anchor(), now);
    }
    format_hms(hours)
}
