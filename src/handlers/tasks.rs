use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Local, Utc};

use crate::{
    dashboard::{self, DashboardSummary},
    error::AppError,
    middleware::{CurrentUser, PathParam, QueryParams, ValidatedJson},
    models::{CreateTask, DeleteTasksParams, DeletedCount, ListTasksParams, Task, UpdateTask},
    ownership::assert_ownership,
    query,
    repository::{NewTask, TaskChanges, TaskRepository},
};

/// A supplied deadline must lie strictly after `now`.
pub fn ensure_future_deadline(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), AppError> {
    match deadline {
        Some(deadline) if deadline <= now => Err(AppError::ValidationFailed(
            "deadline must be in the future".to_string(),
        )),
        _ => Ok(()),
    }
}

#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created successfully", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn create_task(
    State(tasks): State<TaskRepository>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(payload): ValidatedJson<CreateTask>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    ensure_future_deadline(payload.deadline, Utc::now())?;

    let task = tasks.create(NewTask::from_request(user.id, payload)).await?;
    tracing::debug!(task_id = task.id, owner_id = user.id, "created task");

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    params(ListTasksParams),
    responses(
        (status = 200, description = "List tasks", body = Vec<Task>),
        (status = 400, description = "Unknown type, status or sort value"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn get_tasks(
    State(tasks): State<TaskRepository>,
    CurrentUser(user): CurrentUser,
    QueryParams(params): QueryParams<ListTasksParams>,
) -> Result<Json<Vec<Task>>, AppError> {
    let (filter, sort) = query::build_list_query(user.id, &params)?;
    Ok(Json(tasks.find(&filter, Some(sort)).await?))
}

#[utoipa::path(
    get,
    path = "/tasks/dashboard/{type}",
    tag = "tasks",
    params(
        ("type" = String, Path, description = "One of all, work, personal")
    ),
    responses(
        (status = 200, description = "Dashboard summary", body = DashboardSummary),
        (status = 400, description = "Unknown dashboard type"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn get_dashboard(
    State(tasks): State<TaskRepository>,
    CurrentUser(user): CurrentUser,
    PathParam(dashboard_type): PathParam<String>,
) -> Result<Json<DashboardSummary>, AppError> {
    let filter = query::build_dashboard_query(user.id, &dashboard_type)?;
    let found = tasks.find(&filter, None).await?;
    Ok(Json(dashboard::summarize(found, &Local::now())))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = i64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Get task details", body = Task),
        (status = 403, description = "Task belongs to another user"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn get_task(
    State(tasks): State<TaskRepository>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<Task>, AppError> {
    let task = assert_ownership(tasks.find_by_id(id).await?, user.id)?;
    Ok(Json(task))
}

#[utoipa::path(
    put,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = i64, Path, description = "Task ID")
    ),
    request_body = CreateTask,
    responses(
        (status = 200, description = "Task replaced", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Task belongs to another user"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn update_task(
    State(tasks): State<TaskRepository>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
    ValidatedJson(payload): ValidatedJson<CreateTask>,
) -> Result<Json<Task>, AppError> {
    assert_ownership(tasks.find_by_id(id).await?, user.id)?;
    ensure_future_deadline(payload.deadline, Utc::now())?;

    let task = tasks
        .update_by_id(id, TaskChanges::replace(payload))
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    Ok(Json(task))
}

#[utoipa::path(
    patch,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = i64, Path, description = "Task ID")
    ),
    request_body = UpdateTask,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Task belongs to another user"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn patch_task(
    State(tasks): State<TaskRepository>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
    ValidatedJson(payload): ValidatedJson<UpdateTask>,
) -> Result<Json<Task>, AppError> {
    assert_ownership(tasks.find_by_id(id).await?, user.id)?;
    ensure_future_deadline(payload.deadline, Utc::now())?;

    let task = tasks
        .update_by_id(id, TaskChanges::partial(payload))
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = i64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task deleted", body = Task),
        (status = 403, description = "Task belongs to another user"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn delete_task(
    State(tasks): State<TaskRepository>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<Task>, AppError> {
    assert_ownership(tasks.find_by_id(id).await?, user.id)?;

    let task = tasks
        .delete_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/tasks",
    tag = "tasks",
    params(DeleteTasksParams),
    responses(
        (status = 200, description = "Matching tasks deleted", body = DeletedCount),
        (status = 400, description = "Unknown type or status value"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn delete_tasks(
    State(tasks): State<TaskRepository>,
    CurrentUser(user): CurrentUser,
    QueryParams(params): QueryParams<DeleteTasksParams>,
) -> Result<Json<DeletedCount>, AppError> {
    let filter = query::build_bulk_delete_query(user.id, &params)?;
    let deleted_count = tasks.delete_many(&filter).await?;
    tracing::info!(owner_id = user.id, deleted_count, "bulk deleted tasks");

    Ok(Json(DeletedCount { deleted_count }))
}
