use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, patch, put},
};
use db::{
    models::{
        comment::CommentWithAuthor,
        task::{BulkTaskUpdate, Task, TaskDetails, UpdateTask},
    },
    types::TaskStatus,
};
use deployment::Deployment;
use serde::Deserialize;
use services::services::task::BulkUpdateResult;
use utils_core::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl, error::ApiError, http::AuthUser, middleware::load_task_middleware,
    routes::spawn_event_flush,
};

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskAssigneeRequest {
    /// `null` unassigns.
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateTasksRequest {
    pub tasks: Vec<BulkTaskUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

pub async fn get_task(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<TaskDetails>>, ApiError> {
    let details = deployment
        .tasks()
        .get(&deployment.db().pool, task.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(details)))
}

pub async fn update_task(
    Extension(user): Extension<AuthUser>,
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let updated = deployment
        .tasks()
        .update(&deployment.db().pool, task.id, user.id, &payload)
        .await?;
    if updated.assignee_id != task.assignee_id {
        spawn_event_flush(&deployment);
    }
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn update_task_status(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateTaskStatusRequest>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let task = deployment
        .tasks()
        .update_status(&deployment.db().pool, task.id, payload.status)
        .await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn update_task_assignee(
    Extension(user): Extension<AuthUser>,
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateTaskAssigneeRequest>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let task = deployment
        .tasks()
        .update_assignee(&deployment.db().pool, task.id, user.id, payload.assignee_id)
        .await?;
    spawn_event_flush(&deployment);
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn delete_task(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .tasks()
        .delete(&deployment.db().pool, task.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_subtasks(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let subtasks = deployment
        .tasks()
        .subtasks(&deployment.db().pool, task.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(subtasks)))
}

/// Applies each item independently; the response reports every outcome.
pub async fn bulk_update_tasks(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<BulkUpdateTasksRequest>,
) -> Result<ResponseJson<ApiResponse<Vec<BulkUpdateResult>>>, ApiError> {
    let results = deployment
        .tasks()
        .bulk_update(&deployment.db().pool, &payload.tasks)
        .await;
    let failed = results.iter().filter(|result| !result.ok).count();
    if failed > 0 {
        tracing::debug!(failed, total = results.len(), "bulk task update partially failed");
    }
    Ok(ResponseJson(ApiResponse::success(results)))
}

pub async fn get_comments(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<CommentWithAuthor>>>, ApiError> {
    let comments = deployment
        .comments()
        .list(&deployment.db().pool, task.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(comments)))
}

pub async fn create_comment(
    Extension(user): Extension<AuthUser>,
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CommentRequest>,
) -> Result<ResponseJson<ApiResponse<CommentWithAuthor>>, ApiError> {
    let comment = deployment
        .comments()
        .create(&deployment.db().pool, task.id, user.id, &payload.content)
        .await?;
    spawn_event_flush(&deployment);
    Ok(ResponseJson(ApiResponse::success(comment)))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let task_id_router = Router::new()
        .route("/", get(get_task).put(update_task).delete(delete_task))
        .route("/status", patch(update_task_status))
        .route("/assignee", patch(update_task_assignee))
        .route("/subtasks", get(get_subtasks))
        .route("/comments", get(get_comments).post(create_comment))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_task_middleware::<DeploymentImpl>,
        ));

    let inner = Router::new()
        .route("/bulk", put(bulk_update_tasks))
        .nest("/{task_id}", task_id_router);

    Router::new().nest("/tasks", inner)
}
