use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    project::{CreateProject, Project},
    space::{Space, UpdateSpace},
};
use deployment::Deployment;
use utils_core::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, http::AuthUser, middleware::load_space_middleware};

pub async fn get_space(
    Extension(space): Extension<Space>,
) -> Result<ResponseJson<ApiResponse<Space>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(space)))
}

pub async fn update_space(
    Extension(space): Extension<Space>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateSpace>,
) -> Result<ResponseJson<ApiResponse<Space>>, ApiError> {
    let space = deployment
        .hierarchy()
        .update_space(&deployment.db().pool, space.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(space)))
}

pub async fn delete_space(
    Extension(space): Extension<Space>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .hierarchy()
        .delete_space(&deployment.db().pool, space.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_projects(
    Extension(space): Extension<Space>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Project>>>, ApiError> {
    let projects = deployment
        .hierarchy()
        .list_projects(&deployment.db().pool, space.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(projects)))
}

pub async fn create_project(
    Extension(user): Extension<AuthUser>,
    Extension(space): Extension<Space>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateProject>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    tracing::debug!("Creating project '{}' in space {}", payload.name, space.id);
    let project = deployment
        .hierarchy()
        .create_project(&deployment.db().pool, space.id, user.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let space_id_router = Router::new()
        .route("/", get(get_space).put(update_space).delete(delete_space))
        .route("/projects", get(get_projects).post(create_project))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_space_middleware::<DeploymentImpl>,
        ));

    Router::new().nest("/spaces/{space_id}", space_id_router)
}
