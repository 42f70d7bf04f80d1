//! Task routes: full management for admins, own assignments for employees.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use csv::Writer;

use backoffice_common::{Capability, Task, TaskInput};

use crate::auth::{require, CurrentUser};
use crate::error::{ApiError, Result};
use crate::store::StoreError;
use crate::AppState;

const CSV_HEADERS: [&str; 10] = [
    "ID",
    "Title",
    "Priority",
    "Status",
    "Start Date",
    "End Date",
    "Milestone",
    "Notes",
    "Assigned To",
    "Created At",
];

/// Trim the title and check the assignee exists.
fn validate(state: &AppState, mut input: TaskInput) -> Result<TaskInput> {
    input.title = input.title.trim().to_string();
    if input.title.is_empty() {
        return Err(ApiError::InvalidRequest("title must not be empty".to_string()));
    }
    if let (Some(start), Some(end)) = (input.start_date, input.end_date) {
        if end < start {
            return Err(ApiError::InvalidRequest(
                "end_date must not be before start_date".to_string(),
            ));
        }
    }

    input.assigned_to = input.assigned_to.filter(|id| !id.trim().is_empty());
    if let Some(assignee) = &input.assigned_to {
        match state.store.get_user(assignee) {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                return Err(ApiError::InvalidRequest(format!(
                    "unknown assignee '{}'",
                    assignee
                )))
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(input)
}

/// GET /api/tasks
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Task>>> {
    require(&user, Capability::ManageTasks)?;
    Ok(Json(state.store.list_tasks()?))
}

/// POST /api/tasks
async fn create_task(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<TaskInput>,
) -> Result<(StatusCode, Json<Task>)> {
    require(&user, Capability::ManageTasks)?;
    let input = validate(&state, input)?;
    let task = state.store.create_task(&input, Utc::now())?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// PUT /api/tasks/:id
async fn update_task(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<String>,
    Json(input): Json<TaskInput>,
) -> Result<Json<Task>> {
    require(&user, Capability::ManageTasks)?;
    let input = validate(&state, input)?;
    Ok(Json(state.store.update_task(&task_id, &input)?))
}

/// DELETE /api/tasks/:id
async fn delete_task(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<String>,
) -> Result<StatusCode> {
    require(&user, Capability::ManageTasks)?;
    if state.store.delete_task(&task_id)? {
        tracing::info!("Task {} deleted by {}", task_id, user.id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("task {}", task_id)))
    }
}

/// GET /api/tasks/mine
async fn my_tasks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Task>>> {
    require(&user, Capability::ViewOwnTasks)?;
    Ok(Json(state.store.list_tasks_for(&user.id)?))
}

/// Render tasks as CSV, one row per task in the given order.
pub fn tasks_csv(tasks: &[Task]) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut wtr = Writer::from_writer(Vec::new());
    wtr.write_record(CSV_HEADERS)?;

    for task in tasks {
        let start_date = task.start_date.map(|d| d.to_string()).unwrap_or_default();
        let end_date = task.end_date.map(|d| d.to_string()).unwrap_or_default();
        let created_at = task.created_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        wtr.write_record([
            task.id.as_str(),
            task.title.as_str(),
            task.priority.as_str(),
            task.status.as_str(),
            start_date.as_str(),
            end_date.as_str(),
            task.milestone.as_deref().unwrap_or(""),
            task.notes.as_deref().unwrap_or(""),
            task.assigned_to.as_deref().unwrap_or(""),
            created_at.as_str(),
        ])?;
    }

    wtr.flush()?;
    wtr.into_inner().map_err(|e| e.into_error().into())
}

/// GET /api/tasks/export
async fn export_tasks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    require(&user, Capability::ManageTasks)?;

    let tasks = state.store.list_tasks()?;
    let body = tasks_csv(&tasks).map_err(|e| ApiError::Internal(format!("CSV export failed: {}", e)))?;
    let disposition = format!(
        "attachment; filename=\"tasks_export_{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );

    tracing::info!("Exported {} tasks for {}", tasks.len(), user.id);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/export", get(export_tasks))
        .route("/api/tasks/mine", get(my_tasks))
        .route("/api/tasks/:id", put(update_task).delete(delete_task))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_common::{TaskPriority, TaskStatus};
    use chrono::{NaiveDate, TimeZone};

    fn task(title: &str, notes: Option<&str>) -> Task {
        Task {
            id: "t1".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
            title: title.to_string(),
            priority: TaskPriority::High,
            status: TaskStatus::InProgress,
            start_date: NaiveDate::from_ymd_opt(2024, 6, 3),
            end_date: None,
            milestone: None,
            notes: notes.map(String::from),
            assigned_to: Some("u2".to_string()),
        }
    }

    #[test]
    fn test_csv_header_and_row() {
        let out = String::from_utf8(tasks_csv(&[task("Deck", None)]).unwrap()).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ID,Title,Priority,Status,Start Date,End Date,Milestone,Notes,Assigned To,Created At"
        );
        assert_eq!(
            lines.next().unwrap(),
            "t1,Deck,High,In Progress,2024-06-03,,,,u2,2024-06-03T09:00:00.000Z"
        );
    }

    #[test]
    fn test_csv_escapes_quotes_and_commas() {
        let out = String::from_utf8(
            tasks_csv(&[task("Call \"Big\" Fund, LP", Some("line one\nline two"))]).unwrap(),
        )
        .unwrap();

        let mut reader = csv::Reader::from_reader(out.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[1], "Call \"Big\" Fund, LP");
        assert_eq!(&record[7], "line one\nline two");
        assert!(out.contains("\"Call \"\"Big\"\" Fund, LP\""));
    }

    #[test]
    fn test_csv_empty_list_has_header_only() {
        let out = String::from_utf8(tasks_csv(&[]).unwrap()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}
