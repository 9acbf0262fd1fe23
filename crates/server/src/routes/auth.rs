use axum::{Json, Router, extract::State, response::Json as ResponseJson, routing::post};
use deployment::Deployment;
use serde::Deserialize;
use services::services::auth::{AuthSession, LoginRequest, RegisterRequest};
use utils_core::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

pub async fn register(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<RegisterRequest>,
) -> Result<ResponseJson<ApiResponse<AuthSession>>, ApiError> {
    let session = deployment
        .auth()
        .register(&deployment.db().pool, &payload)
        .await?;
    tracing::info!(user_id = %session.user.id, "user registered");
    Ok(ResponseJson(ApiResponse::success(session)))
}

pub async fn login(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<LoginRequest>,
) -> Result<ResponseJson<ApiResponse<AuthSession>>, ApiError> {
    let session = deployment
        .auth()
        .login(&deployment.db().pool, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(session)))
}

pub async fn refresh(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<ResponseJson<ApiResponse<AuthSession>>, ApiError> {
    let session = deployment
        .auth()
        .refresh(&deployment.db().pool, &payload.refresh_token)
        .await?;
    Ok(ResponseJson(ApiResponse::success(session)))
}

pub async fn logout(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .auth()
        .logout(&deployment.db().pool, &payload.refresh_token)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// Public routes; everything else under `/api` requires a bearer token.
pub fn router() -> Router<DeploymentImpl> {
    let inner = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout));

    Router::new().nest("/auth", inner)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn register_login_refresh_and_logout() {
        let app = TestApp::new().await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "name": "Ada", "email": "Ada@Example.com", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["email"], "ada@example.com");

        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "ada@example.com", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let refresh_token = body["data"]["refresh_token"].as_str().unwrap().to_string();

        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/refresh",
                None,
                Some(json!({ "refresh_token": refresh_token })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let rotated = body["data"]["refresh_token"].as_str().unwrap().to_string();
        assert_ne!(rotated, refresh_token);

        // the old token was consumed by the rotation
        let (status, _) = app
            .request(
                Method::POST,
                "/api/auth/refresh",
                None,
                Some(json!({ "refresh_token": refresh_token })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .request(
                Method::POST,
                "/api/auth/logout",
                None,
                Some(json!({ "refresh_token": rotated })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_and_bad_password_is_unauthorized() {
        let app = TestApp::new().await;
        app.register("Ada", "ada@example.com").await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "name": "Ada", "email": "ada@example.com", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (status, _) = app
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "ada@example.com", "password": "wrong password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
