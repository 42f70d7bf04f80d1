use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use backoffice_common::Role;

use crate::tracking::accrual;

/// Identity record, created on first authentication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// User ID from the token issuer (sub claim)
    pub id: String,
    pub email: Option<String>,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    /// When the user first authenticated
    pub created_at: DateTime<Utc>,
    /// Most recent sign-in reported by the token issuer
    pub last_sign_in_at: Option<DateTime<Utc>>,
    /// Last heartbeat, accrued or not
    pub last_active_timestamp: Option<DateTime<Utc>>,
}

impl User {
    /// Name shown in presence lists and reports.
    pub fn display_name(&self) -> String {
        if let Some(full) = self.full_name.as_deref().filter(|s| !s.trim().is_empty()) {
            return full.to_string();
        }
        let joined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let joined = joined.trim();
        if !joined.is_empty() {
            return joined.to_string();
        }
        self.email.clone().unwrap_or_else(|| self.id.clone())
    }

    /// Instant elapsed active time is measured from.
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        accrual::select_anchor(self.last_active_timestamp, self.last_sign_in_at)
    }
}

/// User together with the hours projected from the work-log table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserWithHours {
    #[serde(flatten)]
    pub user: User,
    /// Sum of every work-log entry.
    pub total_hours: f64,
    /// Hours per UTC day, keyed `YYYY-MM-DD`.
    pub work_log: BTreeMap<String, f64>,
}

/// Admin edit of another user. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Self-service profile edit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: Some("alice@example.com".to_string()),
            role: Role::Employee,
            first_name: None,
            last_name: None,
            full_name: None,
            avatar_url: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            last_sign_in_at: None,
            last_active_timestamp: None,
        }
    }

    #[test]
    fn test_display_name_prefers_full_name() {
        let mut u = user();
        u.full_name = Some("Alice Johnson".to_string());
        u.first_name = Some("Al".to_string());
        assert_eq!(u.display_name(), "Alice Johnson");
    }

    #[test]
    fn test_display_name_joins_parts() {
        let mut u = user();
        u.first_name = Some("Alice".to_string());
        assert_eq!(u.display_name(), "Alice");
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(user().display_name(), "alice@example.com");

        let mut u = user();
        u.email = None;
        assert_eq!(u.display_name(), "u1");
    }

    #[test]
    fn test_user_with_hours_flattens() {
        let mut work_log = BTreeMap::new();
        work_log.insert("2024-06-01".to_string(), 2.5);
        let row = UserWithHours {
            user: user(),
            total_hours: 2.5,
            work_log,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["id"], "u1");
        assert_eq!(json["role"], "employee");
        assert_eq!(json["total_hours"], 2.5);
        assert_eq!(json["work_log"]["2024-06-01"], 2.5);
    }
}
