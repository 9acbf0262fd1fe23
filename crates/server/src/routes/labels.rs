use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::label::{Label, UpdateLabel};
use deployment::Deployment;
use utils_core::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

pub async fn get_label(
    State(deployment): State<DeploymentImpl>,
    Path(label_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Label>>, ApiError> {
    let label = deployment
        .hierarchy()
        .get_label(&deployment.db().pool, label_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(label)))
}

pub async fn update_label(
    State(deployment): State<DeploymentImpl>,
    Path(label_id): Path<Uuid>,
    Json(payload): Json<UpdateLabel>,
) -> Result<ResponseJson<ApiResponse<Label>>, ApiError> {
    let label = deployment
        .hierarchy()
        .update_label(&deployment.db().pool, label_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(label)))
}

/// Also detaches the label from every task carrying it.
pub async fn delete_label(
    State(deployment): State<DeploymentImpl>,
    Path(label_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .hierarchy()
        .delete_label(&deployment.db().pool, label_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route(
        "/labels/{label_id}",
        get(get_label).put(update_label).delete(delete_label),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn deleting_a_label_detaches_it_from_tasks() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let project_id = app.project(&ada).await;
        let token = Some(ada.token.as_str());

        let (_, body) = app
            .request(
                Method::POST,
                &format!("/api/projects/{project_id}/labels"),
                token,
                Some(json!({ "name": "infra", "color": "#336699" })),
            )
            .await;
        let label_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .request(
                Method::PUT,
                &format!("/api/labels/{label_id}"),
                token,
                Some(json!({ "name": "platform" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "platform");
        assert_eq!(body["data"]["color"], "#336699");

        let (_, body) = app
            .request(
                Method::POST,
                &format!("/api/projects/{project_id}/tasks"),
                token,
                Some(json!({ "title": "Upgrade", "label_ids": [label_id] })),
            )
            .await;
        let task_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .request(Method::DELETE, &format!("/api/labels/{label_id}"), token, None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .request(Method::GET, &format!("/api/labels/{label_id}"), token, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = app
            .request(Method::GET, &format!("/api/tasks/{task_id}"), token, None)
            .await;
        assert!(body["data"]["labels"].as_array().unwrap().is_empty());
        assert!(body["data"]["label_ids"].as_array().unwrap().is_empty());
    }
}
