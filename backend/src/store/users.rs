use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use backoffice_common::Role;

use crate::auth::AuthUser;
use crate::models::user::{User, UserUpdate, UserWithHours};

use super::work_logs::load_hours;
use super::{opt_ts_column, ts, ts_column, Store, StoreError};

const USER_COLUMNS: &str = "id, email, role, first_name, last_name, full_name, avatar_url, \
                            created_at, last_sign_in_at, last_active_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(2)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        // Unknown role strings fall back to the least privileged role
        role: role.parse().unwrap_or_default(),
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        full_name: row.get(5)?,
        avatar_url: row.get(6)?,
        created_at: ts_column(row, 7)?,
        last_sign_in_at: opt_ts_column(row, 8)?,
        last_active_timestamp: opt_ts_column(row, 9)?,
    })
}

fn is_deleted(conn: &Connection, user_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM deleted_users WHERE id = ?1)",
        params![user_id],
        |row| row.get(0),
    )
}

pub(super) fn find_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        params![user_id],
        user_from_row,
    )
    .optional()
}

impl Store {
    /// Find or create the identity record for an authenticated caller.
    ///
    /// New users get `role_if_new`. Existing users keep their stored role; their
    /// email is refreshed and `last_sign_in_at` only ever moves forward.
    /// Deleted users are refused with [`StoreError::Deleted`].
    pub fn upsert_identity(
        &self,
        auth: &AuthUser,
        role_if_new: Role,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let conn = self.conn()?;

        if is_deleted(&conn, &auth.sub)? {
            return Err(StoreError::Deleted(auth.sub.clone()));
        }

        match find_user(&conn, &auth.sub)? {
            Some(mut user) => {
                // iat moves on every token refresh, so it only seeds a missing sign-in
                let token_sign_in = match user.last_sign_in_at {
                    Some(_) => auth.signed_in_at,
                    None => auth.signed_in_at.or(auth.issued_at),
                };
                let newer_sign_in = match (token_sign_in, user.last_sign_in_at) {
                    (Some(token), Some(stored)) if token > stored => Some(token),
                    (Some(token), None) => Some(token),
                    _ => None,
                };

                conn.execute(
                    "UPDATE users SET email = COALESCE(?1, email),
                                      last_sign_in_at = COALESCE(?2, last_sign_in_at)
                     WHERE id = ?3",
                    params![auth.email, newer_sign_in.map(ts), auth.sub],
                )?;

                if let Some(email) = &auth.email {
                    user.email = Some(email.clone());
                }
                if let Some(signed_in) = newer_sign_in {
                    tracing::debug!("User {} signed in at {}", user.id, signed_in);
                    user.last_sign_in_at = Some(signed_in);
                }
                Ok(user)
            }
            None => {
                let user = User {
                    id: auth.sub.clone(),
                    email: auth.email.clone(),
                    role: role_if_new,
                    first_name: None,
                    last_name: None,
                    full_name: auth.name.clone(),
                    avatar_url: None,
                    created_at: now,
                    last_sign_in_at: auth.signed_in_at.or(auth.issued_at),
                    last_active_timestamp: None,
                };

                conn.execute(
                    "INSERT INTO users (id, email, role, full_name, created_at, last_sign_in_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        user.id,
                        user.email,
                        user.role.as_str(),
                        user.full_name,
                        ts(user.created_at),
                        user.last_sign_in_at.map(ts),
                    ],
                )?;

                tracing::info!(
                    "Created new user: {} ({}) as {}",
                    user.id,
                    user.email.as_deref().unwrap_or("no email"),
                    user.role
                );
                Ok(user)
            }
        }
    }

    pub fn get_user(&self, user_id: &str) -> Result<User, StoreError> {
        let conn = self.conn()?;
        find_user(&conn, user_id)?.ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// A user with `total_hours` and `work_log` projected from the work-log table.
    pub fn user_with_hours(&self, user_id: &str) -> Result<UserWithHours, StoreError> {
        let conn = self.conn()?;
        let user = find_user(&conn, user_id)?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        let (total_hours, work_log) = load_hours(&conn, user_id)?;
        Ok(UserWithHours {
            user,
            total_hours,
            work_log,
        })
    }

    pub fn list_users_with_hours(&self) -> Result<Vec<UserWithHours>, StoreError> {
        let users = self.list_users()?;
        let conn = self.conn()?;
        users
            .into_iter()
            .map(|user| {
                let (total_hours, work_log) = load_hours(&conn, &user.id)?;
                Ok(UserWithHours {
                    user,
                    total_hours,
                    work_log,
                })
            })
            .collect()
    }

    /// Merge an edit into a user. Absent fields keep their value; the full
    /// name is recomputed when both first and last names are supplied.
    pub fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<User, StoreError> {
        let conn = self.conn()?;
        let mut user = find_user(&conn, user_id)?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

        let non_empty = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        let first_name = non_empty(&update.first_name);
        let last_name = non_empty(&update.last_name);

        if let (Some(first), Some(last)) = (&first_name, &last_name) {
            user.full_name = Some(format!("{} {}", first, last));
        }
        if first_name.is_some() {
            user.first_name = first_name;
        }
        if last_name.is_some() {
            user.last_name = last_name;
        }
        if let Some(role) = update.role {
            if role != user.role {
                tracing::info!("Changing role of {} from {} to {}", user.id, user.role, role);
            }
            user.role = role;
        }

        conn.execute(
            "UPDATE users SET first_name = ?1, last_name = ?2, full_name = ?3, role = ?4 WHERE id = ?5",
            params![
                user.first_name,
                user.last_name,
                user.full_name,
                user.role.as_str(),
                user.id
            ],
        )?;

        Ok(user)
    }

    pub fn set_avatar_url(&self, user_id: &str, avatar_url: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET avatar_url = ?1 WHERE id = ?2",
            params![avatar_url, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    /// Delete a user, their work logs and their task assignments.
    ///
    /// The id is remembered so tokens still held by the user cannot recreate
    /// the account. Returns false if the user did not exist.
    pub fn delete_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM work_logs WHERE user_id = ?1", params![user_id])?;
        tx.execute(
            "UPDATE tasks SET assigned_to = NULL WHERE assigned_to = ?1",
            params![user_id],
        )?;
        let deleted = tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        if deleted > 0 {
            tx.execute(
                "INSERT OR REPLACE INTO deleted_users (id, deleted_at) VALUES (?1, ?2)",
                params![user_id, ts(now)],
            )?;
        }

        tx.commit()?;

        if deleted > 0 {
            tracing::info!("Deleted user {}", user_id);
        }
        Ok(deleted > 0)
    }
}
