use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::work_log::WorkLogEntry;
use crate::tracking::accrual::{self, Accrual, AccrualPolicy};

use super::users::find_user;
use super::{date_column, day, ts, ts_column, Store, StoreError};

/// Result of applying one heartbeat inside the store transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatOutcome {
    /// Anchor the delta was measured from.
    pub anchor: Option<DateTime<Utc>>,
    pub accrual: Accrual,
    pub work_date: NaiveDate,
    /// Hours logged on `work_date` after this heartbeat.
    pub day_hours: f64,
    /// Hours logged across all days after this heartbeat.
    pub total_hours: f64,
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<WorkLogEntry> {
    Ok(WorkLogEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        work_date: date_column(row, 2)?,
        hours_worked: row.get(3)?,
        updated_at: ts_column(row, 4)?,
    })
}

/// `(total_hours, work_log)` projection for one user.
pub(super) fn load_hours(
    conn: &Connection,
    user_id: &str,
) -> rusqlite::Result<(f64, BTreeMap<String, f64>)> {
    let mut stmt = conn.prepare_cached(
        "SELECT work_date, hours_worked FROM work_logs WHERE user_id = ?1 ORDER BY work_date",
    )?;
    let work_log = stmt
        .query_map(params![user_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    let total_hours = work_log.values().sum();
    Ok((total_hours, work_log))
}

impl Store {
    /// Evaluate and record a heartbeat for `user_id` at `now`.
    ///
    /// The anchor read, the `last_active_at` advance and the work-log upsert
    /// share one transaction, so concurrent heartbeats from the same user are
    /// applied one after the other and each sees the previous one's anchor.
    pub fn apply_heartbeat(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        policy: &AccrualPolicy,
    ) -> Result<HeartbeatOutcome, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let user = find_user(&tx, user_id)?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

        let anchor = user.anchor();
        let accrual = policy.evaluate(anchor, now);
        let work_date = accrual::work_date(now);

        tx.execute(
            "UPDATE users SET last_active_at = ?1 WHERE id = ?2",
            params![ts(now), user_id],
        )?;

        if let Accrual::Accepted { hours } = accrual {
            tx.execute(
                "INSERT INTO work_logs (id, user_id, work_date, hours_worked, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, work_date) DO UPDATE SET
                     hours_worked = hours_worked + excluded.hours_worked,
                     updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    day(work_date),
                    hours,
                    ts(now)
                ],
            )?;
        }

        let (total_hours, work_log) = load_hours(&tx, user_id)?;
        tx.commit()?;

        let day_hours = work_log.get(&day(work_date)).copied().unwrap_or(0.0);

        Ok(HeartbeatOutcome {
            anchor,
            accrual,
            work_date,
            day_hours,
            total_hours,
        })
    }

    pub fn work_log_entry(
        &self,
        user_id: &str,
        work_date: NaiveDate,
    ) -> Result<Option<WorkLogEntry>, StoreError> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT id, user_id, work_date, hours_worked, updated_at
                 FROM work_logs WHERE user_id = ?1 AND work_date = ?2",
                params![user_id, day(work_date)],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Every work-log row, most recent day first.
    pub fn list_work_logs(&self) -> Result<Vec<WorkLogEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, work_date, hours_worked, updated_at
             FROM work_logs ORDER BY work_date DESC, user_id ASC",
        )?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
