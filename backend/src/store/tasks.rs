use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use backoffice_common::{Task, TaskInput, TaskPriority, TaskStatus};

use super::{day, opt_date_column, ts, ts_column, Store, StoreError};

const TASK_COLUMNS: &str = "id, created_at, title, priority, status, start_date, end_date, \
                            milestone, notes, assigned_to";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let priority: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        created_at: ts_column(row, 1)?,
        title: row.get(2)?,
        priority: TaskPriority::parse(&priority).unwrap_or_default(),
        status: TaskStatus::parse(&status).unwrap_or_default(),
        start_date: opt_date_column(row, 5)?,
        end_date: opt_date_column(row, 6)?,
        milestone: row.get(7)?,
        notes: row.get(8)?,
        assigned_to: row.get(9)?,
    })
}

impl Store {
    /// All tasks, newest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks ORDER BY created_at DESC",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Tasks assigned to `user_id`, newest first.
    pub fn list_tasks_for(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE assigned_to = ?1 ORDER BY created_at DESC",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map(params![user_id], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            params![task_id],
            task_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("task {}", task_id)))
    }

    pub fn create_task(&self, input: &TaskInput, now: DateTime<Utc>) -> Result<Task, StoreError> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            title: input.title.clone(),
            priority: input.priority,
            status: input.status,
            start_date: input.start_date,
            end_date: input.end_date,
            milestone: input.milestone.clone(),
            notes: input.notes.clone(),
            assigned_to: input.assigned_to.clone(),
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                TASK_COLUMNS
            ),
            params![
                task.id,
                ts(task.created_at),
                task.title,
                task.priority.as_str(),
                task.status.as_str(),
                task.start_date.map(day),
                task.end_date.map(day),
                task.milestone,
                task.notes,
                task.assigned_to,
            ],
        )?;

        tracing::info!("Created task {} ({})", task.id, task.title);
        Ok(task)
    }

    /// Replace every editable field of a task.
    pub fn update_task(&self, task_id: &str, input: &TaskInput) -> Result<Task, StoreError> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE tasks SET title = ?1, priority = ?2, status = ?3, start_date = ?4,
                                  end_date = ?5, milestone = ?6, notes = ?7, assigned_to = ?8
                 WHERE id = ?9",
                params![
                    input.title,
                    input.priority.as_str(),
                    input.status.as_str(),
                    input.start_date.map(day),
                    input.end_date.map(day),
                    input.milestone,
                    input.notes,
                    input.assigned_to,
                    task_id,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("task {}", task_id)));
            }
        }
        self.get_task(task_id)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(deleted > 0)
    }
}
