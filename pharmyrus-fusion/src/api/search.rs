//! POST /search

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{engine::NoProgress, error::ApiResult, tasks::TaskHandle, types::SearchRequest, AppState};

/// 202 body for `asyncMode` requests
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAccepted {
    pub task_id: TaskHandle,
    pub status_url: String,
}

/// Run a search, or hand it to the task manager when `options.asyncMode` is set
///
/// The request is validated up front in both modes so a bad request is a
/// 400 rather than a failed task.
pub async fn search(State(state): State<AppState>, Json(request): Json<SearchRequest>) -> ApiResult<Response> {
    request.validate()?;

    if request.options.async_mode {
        let handle = state.tasks.submit(request);
        let body = SearchAccepted {
            task_id: handle,
            status_url: format!("/tasks/{}", handle),
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let report = state
        .tasks
        .engine()
        .run(request, &NoProgress, CancellationToken::new())
        .await?;
    Ok(Json(report).into_response())
}

pub fn search_routes() -> Router<AppState> {
    Router::new().route("/search", post(search))
}
