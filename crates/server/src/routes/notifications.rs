use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{delete, get, put},
};
use db::models::notification::{Notification, NotificationCount};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use utils_core::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, http::AuthUser};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct AffectedResponse {
    pub updated: u64,
}

pub async fn get_notifications(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<NotificationListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Notification>>>, ApiError> {
    let notifications = deployment
        .notifications()
        .list(&deployment.db().pool, user.id, query.unread_only)
        .await?;
    Ok(ResponseJson(ApiResponse::success(notifications)))
}

pub async fn get_count(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<NotificationCount>>, ApiError> {
    let count = deployment
        .notifications()
        .count(&deployment.db().pool, user.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(count)))
}

pub async fn mark_read(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
    Path(notification_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Notification>>, ApiError> {
    let notification = deployment
        .notifications()
        .mark_read(&deployment.db().pool, user.id, notification_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(notification)))
}

pub async fn mark_all_read(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<AffectedResponse>>, ApiError> {
    let updated = deployment
        .notifications()
        .mark_all_read(&deployment.db().pool, user.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(AffectedResponse { updated })))
}

pub async fn delete_notification(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
    Path(notification_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .notifications()
        .delete(&deployment.db().pool, user.id, notification_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn delete_all(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<AffectedResponse>>, ApiError> {
    let updated = deployment
        .notifications()
        .delete_all(&deployment.db().pool, user.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(AffectedResponse { updated })))
}

pub fn router() -> Router<DeploymentImpl> {
    let inner = Router::new()
        .route("/", get(get_notifications).delete(delete_all))
        .route("/count", get(get_count))
        .route("/read-all", put(mark_all_read))
        .route("/{notification_id}", delete(delete_notification))
        .route("/{notification_id}/read", put(mark_read));

    Router::new().nest("/notifications", inner)
}
