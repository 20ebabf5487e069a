use crate::{error::AppError, models::Task};

/// Resolves a lookup result into a task the requester may act on.
pub fn assert_ownership(task: Option<Task>, requester_id: i64) -> Result<Task, AppError> {
    let task = task.ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
    if task.owner_id != requester_id {
        tracing::warn!(task_id = task.id, requester_id, "rejected access to foreign task");
        return Err(AppError::Forbidden(
            "You do not have permission to access this task".to_string(),
        ));
    }
    Ok(task)
}
