use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    sprint::{Sprint, UpdateSprint},
    task::Task,
};
use deployment::Deployment;
use serde::Deserialize;
use services::services::sprint::{CompletionPolicy, SprintCompletion};
use utils_core::response::ApiResponse;

use crate::{
    DeploymentImpl, error::ApiError, middleware::load_sprint_middleware, routes::spawn_event_flush,
};

#[derive(Debug, Default, Deserialize)]
pub struct CompleteSprintRequest {
    /// `"backlog"` (default) or the id of the sprint that receives unfinished tasks.
    #[serde(default)]
    pub move_incomplete: Option<String>,
}

pub async fn get_sprint(
    Extension(sprint): Extension<Sprint>,
) -> Result<ResponseJson<ApiResponse<Sprint>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(sprint)))
}

pub async fn update_sprint(
    Extension(sprint): Extension<Sprint>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateSprint>,
) -> Result<ResponseJson<ApiResponse<Sprint>>, ApiError> {
    let sprint = deployment
        .sprints()
        .update(&deployment.db().pool, sprint.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(sprint)))
}

pub async fn delete_sprint(
    Extension(sprint): Extension<Sprint>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .sprints()
        .delete(&deployment.db().pool, sprint.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn start_sprint(
    Extension(sprint): Extension<Sprint>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Sprint>>, ApiError> {
    let sprint = deployment
        .sprints()
        .start(&deployment.db().pool, sprint.id)
        .await?;
    spawn_event_flush(&deployment);
    Ok(ResponseJson(ApiResponse::success(sprint)))
}

pub async fn complete_sprint(
    Extension(sprint): Extension<Sprint>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CompleteSprintRequest>,
) -> Result<ResponseJson<ApiResponse<SprintCompletion>>, ApiError> {
    let policy = match payload.move_incomplete.as_deref() {
        Some(raw) => raw.parse::<CompletionPolicy>()?,
        None => CompletionPolicy::default(),
    };
    let completion = deployment
        .sprints()
        .complete(&deployment.db().pool, sprint.id, policy)
        .await?;
    spawn_event_flush(&deployment);
    Ok(ResponseJson(ApiResponse::success(completion)))
}

pub async fn get_sprint_tasks(
    Extension(sprint): Extension<Sprint>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = deployment
        .sprints()
        .list_tasks(&deployment.db().pool, sprint.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let sprint_id_router = Router::new()
        .route(
            "/",
            get(get_sprint).put(update_sprint).delete(delete_sprint),
        )
        .route("/start", post(start_sprint))
        .route("/complete", post(complete_sprint))
        .route("/tasks", get(get_sprint_tasks))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_sprint_middleware::<DeploymentImpl>,
        ));

    Router::new().nest("/sprints/{sprint_id}", sprint_id_router)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::{TestApp, TestUser};

    async fn sprint(app: &TestApp, user: &TestUser, project_id: uuid::Uuid, name: &str) -> String {
        let (status, body) = app
            .request(
                Method::POST,
                &format!("/api/projects/{project_id}/sprints"),
                Some(&user.token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "PLANNING");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn task_in(
        app: &TestApp,
        user: &TestUser,
        project_id: uuid::Uuid,
        sprint_id: &str,
        status: &str,
    ) -> String {
        let (_, body) = app
            .request(
                Method::POST,
                &format!("/api/projects/{project_id}/tasks"),
                Some(&user.token),
                Some(json!({ "title": status, "status": status, "sprint_id": sprint_id })),
            )
            .await;
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn lifecycle_moves_forward_only() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let project_id = app.project(&ada).await;
        let token = Some(ada.token.as_str());
        let sprint_id = sprint(&app, &ada, project_id, "Sprint 1").await;

        let (status, _) = app
            .request(Method::POST, &format!("/api/sprints/{sprint_id}/complete"), token, Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = app
            .request(Method::POST, &format!("/api/sprints/{sprint_id}/start"), token, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ACTIVE");

        let (status, body) = app
            .request(Method::POST, &format!("/api/sprints/{sprint_id}/start"), token, None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (status, body) = app
            .request(Method::POST, &format!("/api/sprints/{sprint_id}/complete"), token, Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sprint"]["status"], "COMPLETED");

        let (_, body) = app
            .request(Method::GET, &format!("/api/sprints/{sprint_id}"), token, None)
            .await;
        assert_eq!(body["data"]["status"], "COMPLETED");

        app.flush_events().await;
        let (_, body) = app
            .request(Method::GET, "/api/notifications", token, None)
            .await;
        let kinds: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["notification_type"].as_str().unwrap())
            .collect();
        assert!(kinds.contains(&"SPRINT_STARTED"));
        assert!(kinds.contains(&"SPRINT_COMPLETED"));
    }

    #[tokio::test]
    async fn completing_to_backlog_keeps_done_tasks() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let project_id = app.project(&ada).await;
        let token = Some(ada.token.as_str());
        let sprint_id = sprint(&app, &ada, project_id, "Sprint 1").await;

        let open = task_in(&app, &ada, project_id, &sprint_id, "IN_PROGRESS").await;
        let done = task_in(&app, &ada, project_id, &sprint_id, "DONE").await;

        app.request(Method::POST, &format!("/api/sprints/{sprint_id}/start"), token, None)
            .await;
        let (status, body) = app
            .request(
                Method::POST,
                &format!("/api/sprints/{sprint_id}/complete"),
                token,
                Some(json!({ "move_incomplete": "backlog" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["moved_tasks"], 1);

        let (_, body) = app
            .request(Method::GET, &format!("/api/tasks/{open}"), token, None)
            .await;
        assert!(body["data"]["sprint_id"].is_null());

        let (_, body) = app
            .request(Method::GET, &format!("/api/tasks/{done}"), token, None)
            .await;
        assert_eq!(body["data"]["sprint_id"], sprint_id.as_str());
    }

    #[tokio::test]
    async fn completing_into_another_sprint_moves_unfinished_tasks() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let project_id = app.project(&ada).await;
        let token = Some(ada.token.as_str());
        let first = sprint(&app, &ada, project_id, "Sprint 1").await;
        let second = sprint(&app, &ada, project_id, "Sprint 2").await;
        let open = task_in(&app, &ada, project_id, &first, "TODO").await;

        app.request(Method::POST, &format!("/api/sprints/{first}/start"), token, None)
            .await;

        let (status, _) = app
            .request(
                Method::POST,
                &format!("/api/sprints/{first}/complete"),
                token,
                Some(json!({ "move_incomplete": "not-a-sprint" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .request(
                Method::POST,
                &format!("/api/sprints/{first}/complete"),
                token,
                Some(json!({ "move_incomplete": second })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app
            .request(Method::GET, &format!("/api/sprints/{second}/tasks"), token, None)
            .await;
        let tasks = body["data"].as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["id"], open.as_str());
    }

    #[tokio::test]
    async fn unknown_sprint_is_not_found() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let (status, _) = app
            .request(
                Method::POST,
                &format!("/api/sprints/{}/start", uuid::Uuid::new_v4()),
                Some(&ada.token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
