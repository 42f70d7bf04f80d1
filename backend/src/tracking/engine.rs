use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use backoffice_common::{HoursSummary, TimeFilter};

use crate::models::user::UserWithHours;
use crate::store::{Store, StoreError};

use super::accrual::{AccrualPolicy, SkipReason};
use super::display;

/// What a heartbeat did, as reported back to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatReport {
    /// False only when the heartbeat could not be persisted.
    pub success: bool,
    pub accrued_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    pub work_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Applies heartbeats and produces hour summaries.
pub struct ActivityTracker {
    store: Arc<Store>,
    policy: AccrualPolicy,
}

impl ActivityTracker {
    pub fn new(store: Arc<Store>, policy: AccrualPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &AccrualPolicy {
        &self.policy
    }

    /// Record a heartbeat for an authenticated user.
    ///
    /// Persistence failures are logged and reported with `success = false`;
    /// they never propagate to the caller.
    pub fn record_heartbeat(&self, user_id: &str, now: DateTime<Utc>) -> HeartbeatReport {
        match self.store.apply_heartbeat(user_id, now, &self.policy) {
            Ok(outcome) => {
                match outcome.accrual.skip_reason() {
                    None => tracing::debug!(
                        "Heartbeat for {}: +{:.6}h on {} (total {:.4}h)",
                        user_id,
                        outcome.accrual.hours(),
                        outcome.work_date,
                        outcome.total_hours
                    ),
                    Some(reason) => tracing::debug!(
                        "Heartbeat for {} skipped: {} (anchor {:?})",
                        user_id,
                        reason,
                        outcome.anchor
                    ),
                }
                HeartbeatReport {
                    success: true,
                    accrued_hours: outcome.accrual.hours(),
                    skipped: outcome.accrual.skip_reason(),
                    work_date: outcome.work_date,
                    total_hours: Some(outcome.total_hours),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!("Failed to record heartbeat for {}: {}", user_id, e);
                HeartbeatReport {
                    success: false,
                    accrued_hours: 0.0,
                    skipped: None,
                    work_date: now.date_naive(),
                    total_hours: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Hours summary for one user. `is_online` decides whether live time
    /// since the anchor is added.
    pub fn summarize(
        &self,
        user: &UserWithHours,
        filter: TimeFilter,
        is_online: bool,
        now: DateTime<Utc>,
    ) -> HoursSummary {
        let baseline_hours =
            display::baseline_hours(&user.work_log, user.total_hours, filter, now);
        let live_hours = if is_online {
            display::live_hours(user.user.anchor(), now)
        } else {
            0.0
        };

        HoursSummary {
            user_id: user.user.id.clone(),
            name: user.user.display_name(),
            email: user.user.email.clone(),
            filter,
            baseline_hours,
            live_hours,
            is_online,
            elapsed: display::display_elapsed(user, filter, is_online, now),
        }
    }

    /// Summary for a user looked up by id.
    pub fn hours_for(
        &self,
        user_id: &str,
        filter: TimeFilter,
        is_online: bool,
        now: DateTime<Utc>,
    ) -> Result<HoursSummary, StoreError> {
        let user = self.store.user_with_hours(user_id)?;
        Ok(self.summarize(&user, filter, is_online, now))
    }
}
