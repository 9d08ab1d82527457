//! GET /tasks/:id, DELETE /tasks/:id

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    tasks::{TaskHandle, TaskState},
    AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub task_id: TaskHandle,
    #[serde(flatten)]
    pub state: TaskState,
}

pub async fn get_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<TaskStatusResponse>> {
    let handle = TaskHandle(id);
    let task_state = state
        .tasks
        .poll(handle)
        .ok_or_else(|| ApiError::NotFound(format!("task {}", id)))?;
    Ok(Json(TaskStatusResponse {
        task_id: handle,
        state: task_state,
    }))
}

pub async fn cancel_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<TaskStatusResponse>> {
    let handle = TaskHandle(id);
    if !state.tasks.cancel(handle) {
        return match state.tasks.poll(handle) {
            Some(_) => Err(ApiError::Conflict(format!("task {} already finished", id))),
            None => Err(ApiError::NotFound(format!("task {}", id))),
        };
    }
    let task_state = state
        .tasks
        .poll(handle)
        .ok_or_else(|| ApiError::NotFound(format!("task {}", id)))?;
    Ok(Json(TaskStatusResponse {
        task_id: handle,
        state: task_state,
    }))
}

pub fn task_routes() -> Router<AppState> {
    Router::new().route("/tasks/:id", get(get_task).delete(cancel_task))
}
