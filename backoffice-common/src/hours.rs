//! Work-hours reporting types.

use serde::{Deserialize, Serialize};

/// Time window used when summing a user's work log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFilter {
    /// Today's UTC day only.
    #[default]
    Today,
    /// Current UTC week, starting Sunday.
    Week,
    /// Current UTC calendar month.
    Month,
    /// Everything ever accrued.
    All,
}

/// One row of an hours report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoursSummary {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub filter: TimeFilter,
    /// Hours accrued inside the window, excluding live time.
    pub baseline_hours: f64,
    /// Hours since the current anchor, if the user is online.
    pub live_hours: f64,
    pub is_online: bool,
    /// `HH:MM:SS` rendering of baseline plus live time.
    pub elapsed: String,
}
