use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::user::{UpdateUser, User};
use deployment::Deployment;
use services::services::auth::{UserListParams, UserPage};
use utils_core::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, http::AuthUser};

pub async fn get_me(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let me = deployment.auth().me(&deployment.db().pool, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(me)))
}

pub async fn update_me(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let me = deployment
        .auth()
        .update_me(&deployment.db().pool, user.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(me)))
}

pub async fn list_users(
    State(deployment): State<DeploymentImpl>,
    Query(params): Query<UserListParams>,
) -> Result<ResponseJson<ApiResponse<UserPage>>, ApiError> {
    let page = deployment
        .auth()
        .list_users(&deployment.db().pool, &params)
        .await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn get_user(
    State(deployment): State<DeploymentImpl>,
    Path(user_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = deployment
        .auth()
        .get_user(&deployment.db().pool, user_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(get_me).put(update_me))
        .route("/users/{user_id}", get(get_user))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn me_requires_a_valid_token() {
        let app = TestApp::new().await;

        let (status, body) = app.request(Method::GET, "/api/users/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Unauthorized");

        let (status, _) = app
            .request(Method::GET, "/api/users/me", Some("not-a-jwt"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_can_be_read_and_updated() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;

        let (status, body) = app
            .request(Method::GET, "/api/users/me", Some(&ada.token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], ada.id.to_string());
        assert!(body["data"].get("password_hash").is_none());

        let (status, body) = app
            .request(
                Method::PUT,
                "/api/users/me",
                Some(&ada.token),
                Some(json!({ "name": "Ada L.", "status": "BUSY" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Ada L.");
        assert_eq!(body["data"]["status"], "BUSY");
    }

    #[tokio::test]
    async fn users_can_be_listed_searched_and_fetched() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let bob = app.register("Bob", "bob@example.com").await;
        app.register("Cy", "cy@other.org").await;
        let token = Some(ada.token.as_str());

        let (status, body) = app.request(Method::GET, "/api/users", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["page"], 1);
        assert_eq!(body["data"]["items"][0]["name"], "Ada");

        let (_, body) = app
            .request(Method::GET, "/api/users?page=2&page_size=2", token, None)
            .await;
        assert_eq!(body["data"]["total_pages"], 2);
        let items = body["data"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "Cy");

        let (_, body) = app
            .request(Method::GET, "/api/users?search=bob", token, None)
            .await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["id"], bob.id.to_string());

        let (status, body) = app
            .request(Method::GET, &format!("/api/users/{}", bob.id), token, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "bob@example.com");
        assert!(body["data"].get("password_hash").is_none());

        let (status, body) = app
            .request(
                Method::GET,
                &format!("/api/users/{}", uuid::Uuid::new_v4()),
                token,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = app.request(Method::GET, "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
