use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// One row of the `work_logs` table: hours a user accrued on a UTC day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkLogEntry {
    pub id: String,
    pub user_id: String,
    pub work_date: NaiveDate,
    pub hours_worked: f64,
    pub updated_at: DateTime<Utc>,
}
