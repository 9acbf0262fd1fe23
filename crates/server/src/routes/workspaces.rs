use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::{
    models::{
        space::{CreateSpace, Space},
        workspace::{CreateWorkspace, UpdateWorkspace, Workspace},
        workspace_member::{WorkspaceMember, WorkspaceMemberWithUser},
    },
    types::WorkspaceRole,
};
use deployment::Deployment;
use serde::Deserialize;
use utils_core::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl, error::ApiError, http::AuthUser, middleware::load_workspace_middleware,
    routes::spawn_event_flush,
};

#[derive(Debug, Deserialize)]
pub struct AddWorkspaceMemberRequest {
    pub email: String,
    pub role: WorkspaceRole,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkspaceMemberRequest {
    pub role: WorkspaceRole,
}

pub async fn get_workspaces(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Workspace>>>, ApiError> {
    let workspaces = deployment
        .hierarchy()
        .list_workspaces_for_user(&deployment.db().pool, user.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(workspaces)))
}

pub async fn create_workspace(
    Extension(user): Extension<AuthUser>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateWorkspace>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    let workspace = deployment
        .hierarchy()
        .create_workspace(&deployment.db().pool, user.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(workspace)))
}

pub async fn get_workspace(
    Extension(workspace): Extension<Workspace>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(workspace)))
}

pub async fn update_workspace(
    Extension(workspace): Extension<Workspace>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateWorkspace>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    let workspace = deployment
        .hierarchy()
        .update_workspace(&deployment.db().pool, workspace.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(workspace)))
}

pub async fn delete_workspace(
    Extension(workspace): Extension<Workspace>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .hierarchy()
        .delete_workspace(&deployment.db().pool, workspace.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_members(
    Extension(workspace): Extension<Workspace>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<WorkspaceMemberWithUser>>>, ApiError> {
    let members = deployment
        .membership()
        .list_workspace_members(&deployment.db().pool, workspace.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(members)))
}

pub async fn add_member(
    Extension(workspace): Extension<Workspace>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<AddWorkspaceMemberRequest>,
) -> Result<ResponseJson<ApiResponse<WorkspaceMemberWithUser>>, ApiError> {
    let member = deployment
        .membership()
        .add_workspace_member(
            &deployment.db().pool,
            workspace.id,
            &payload.email,
            payload.role,
        )
        .await?;
    spawn_event_flush(&deployment);
    Ok(ResponseJson(ApiResponse::success(member)))
}

pub async fn update_member_role(
    State(deployment): State<DeploymentImpl>,
    Path((workspace_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateWorkspaceMemberRequest>,
) -> Result<ResponseJson<ApiResponse<WorkspaceMember>>, ApiError> {
    let member = deployment
        .membership()
        .update_workspace_member_role(&deployment.db().pool, workspace_id, user_id, payload.role)
        .await?;
    Ok(ResponseJson(ApiResponse::success(member)))
}

pub async fn remove_member(
    State(deployment): State<DeploymentImpl>,
    Path((workspace_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .membership()
        .remove_workspace_member(&deployment.db().pool, workspace_id, user_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_spaces(
    Extension(workspace): Extension<Workspace>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Space>>>, ApiError> {
    let spaces = deployment
        .hierarchy()
        .list_spaces(&deployment.db().pool, workspace.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(spaces)))
}

pub async fn create_space(
    Extension(workspace): Extension<Workspace>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateSpace>,
) -> Result<ResponseJson<ApiResponse<Space>>, ApiError> {
    let space = deployment
        .hierarchy()
        .create_space(&deployment.db().pool, workspace.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(space)))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let workspace_id_router = Router::new()
        .route(
            "/",
            get(get_workspace)
                .put(update_workspace)
                .delete(delete_workspace),
        )
        .route("/members", get(get_members).post(add_member))
        .route("/spaces", get(get_spaces).post(create_space))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_workspace_middleware::<DeploymentImpl>,
        ));

    let workspaces_router = Router::new()
        .route("/", get(get_workspaces).post(create_workspace))
        .route(
            "/{workspace_id}/members/{user_id}",
            put(update_member_role).delete(remove_member),
        )
        .nest("/{workspace_id}", workspace_id_router);

    Router::new().nest("/workspaces", workspaces_router)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn creator_is_listed_as_owner() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/workspaces",
                Some(&ada.token),
                Some(json!({ "name": "Acme" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let workspace_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .request(
                Method::GET,
                &format!("/api/workspaces/{workspace_id}/members"),
                Some(&ada.token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let members = body["data"].as_array().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0]["role"], "OWNER");
        assert_eq!(members[0]["user"]["id"], ada.id.to_string());

        let (_, body) = app
            .request(Method::GET, "/api/workspaces", Some(&ada.token), None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn member_lifecycle_over_http() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let bob = app.register("Bob", "bob@example.com").await;
        let token = Some(ada.token.as_str());

        let (_, body) = app
            .request(
                Method::POST,
                "/api/workspaces",
                token,
                Some(json!({ "name": "Acme" })),
            )
            .await;
        let workspace_id = body["data"]["id"].as_str().unwrap().to_string();
        let members_uri = format!("/api/workspaces/{workspace_id}/members");

        let (status, _) = app
            .request(
                Method::POST,
                &members_uri,
                token,
                Some(json!({ "email": "bob@example.com", "role": "MEMBER" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .request(
                Method::POST,
                &members_uri,
                token,
                Some(json!({ "email": "bob@example.com", "role": "ADMIN" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .request(
                Method::POST,
                &members_uri,
                token,
                Some(json!({ "email": "nobody@example.com", "role": "MEMBER" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let member_uri = format!("{members_uri}/{}", bob.id);
        let (status, body) = app
            .request(Method::PUT, &member_uri, token, Some(json!({ "role": "ADMIN" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "ADMIN");

        let (status, _) = app.request(Method::DELETE, &member_uri, token, None).await;
        assert_eq!(status, StatusCode::OK);
        // removing again is a no-op
        let (status, _) = app.request(Method::DELETE, &member_uri, token, None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app.request(Method::GET, &members_uri, token, None).await;
        let members = body["data"].as_array().unwrap();
        assert!(members.iter().all(|m| m["user"]["id"] != bob.id.to_string()));

        app.flush_events().await;
        let (_, body) = app
            .request(Method::GET, "/api/notifications", Some(&bob.token), None)
            .await;
        let notifications = body["data"].as_array().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["notification_type"], "WORKSPACE_INVITATION");
    }

    #[tokio::test]
    async fn unknown_workspace_is_not_found() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;

        let (status, body) = app
            .request(
                Method::GET,
                &format!("/api/workspaces/{}", uuid::Uuid::new_v4()),
                Some(&ada.token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Workspace not found");
    }
}
