use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::put,
};
use db::models::comment::CommentWithAuthor;
use deployment::Deployment;
use utils_core::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, http::AuthUser, routes::tasks::CommentRequest};

/// Only the author may edit.
pub async fn update_comment(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
    Path(comment_id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> Result<ResponseJson<ApiResponse<CommentWithAuthor>>, ApiError> {
    let comment = deployment
        .comments()
        .update(&deployment.db().pool, comment_id, user.id, &payload.content)
        .await?;
    Ok(ResponseJson(ApiResponse::success(comment)))
}

pub async fn delete_comment(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
    Path(comment_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .comments()
        .delete(&deployment.db().pool, comment_id, user.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route(
        "/comments/{comment_id}",
        put(update_comment).delete(delete_comment),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn only_the_author_can_change_a_comment() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let bob = app.register("Bob", "bob@example.com").await;
        let project_id = app.project(&ada).await;

        let (_, body) = app
            .request(
                Method::POST,
                &format!("/api/projects/{project_id}/tasks"),
                Some(&ada.token),
                Some(json!({ "title": "Discuss" })),
            )
            .await;
        let task_id = body["data"]["id"].as_str().unwrap().to_string();

        let (_, body) = app
            .request(
                Method::POST,
                &format!("/api/tasks/{task_id}/comments"),
                Some(&ada.token),
                Some(json!({ "content": "First draft" })),
            )
            .await;
        let comment_uri = format!("/api/comments/{}", body["data"]["id"].as_str().unwrap());

        let (status, body) = app
            .request(
                Method::PUT,
                &comment_uri,
                Some(&bob.token),
                Some(json!({ "content": "Hijacked" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let (status, _) = app
            .request(Method::DELETE, &comment_uri, Some(&bob.token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .request(
                Method::PUT,
                &comment_uri,
                Some(&ada.token),
                Some(json!({ "content": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .request(
                Method::PUT,
                &comment_uri,
                Some(&ada.token),
                Some(json!({ "content": "Final" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["content"], "Final");
        assert_eq!(body["data"]["author"]["name"], "Ada");

        let (status, _) = app
            .request(Method::DELETE, &comment_uri, Some(&ada.token), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .request(Method::DELETE, &comment_uri, Some(&ada.token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
