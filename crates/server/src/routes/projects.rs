use std::str::FromStr;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::{
    models::{
        label::{CreateLabel, Label},
        project::{Project, UpdateProject},
        project_member::{ProjectMember, ProjectMemberWithUser},
        sprint::{CreateSprint, Sprint},
        task::{CreateTask, SortOrder, Task, TaskFilters, TaskSortField},
    },
    types::ProjectRole,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use utils_core::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl, error::ApiError, http::AuthUser, middleware::load_project_middleware,
    routes::spawn_event_flush,
};

#[derive(Debug, Deserialize)]
pub struct AddProjectMemberRequest {
    pub user_id: Uuid,
    pub role: ProjectRole,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectMemberRequest {
    pub role: ProjectRole,
}

#[derive(Debug, Deserialize)]
pub struct ReorderTasksRequest {
    pub task_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReorderTasksResponse {
    pub updated: u64,
}

/// Task list query string. List filters are comma separated, e.g.
/// `?status=TODO,IN_PROGRESS&sort_by=priority&sort_order=desc`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub assignee: Option<String>,
    pub sprint_id: Option<Uuid>,
    pub label: Option<String>,
    pub search: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub sort_by: Option<TaskSortField>,
    pub sort_order: Option<SortOrder>,
}

fn parse_list<T: FromStr>(raw: Option<&str>, field: &str) -> Result<Vec<T>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid {field} value: {value}")))
        })
        .collect()
}

impl TaskListQuery {
    pub fn into_filters(self) -> Result<TaskFilters, ApiError> {
        Ok(TaskFilters {
            status: parse_list(self.status.as_deref(), "status")?,
            priority: parse_list(self.priority.as_deref(), "priority")?,
            task_type: parse_list(self.task_type.as_deref(), "type")?,
            assignee_ids: parse_list(self.assignee.as_deref(), "assignee")?,
            sprint_id: self.sprint_id,
            label_ids: parse_list(self.label.as_deref(), "label")?,
            search: self.search.filter(|search| !search.trim().is_empty()),
            limit: self.limit,
            offset: self.offset,
            sort_by: self.sort_by.unwrap_or_default(),
            sort_order: self.sort_order.unwrap_or_default(),
        })
    }
}

pub async fn get_project(
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn update_project(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateProject>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    let project = deployment
        .hierarchy()
        .update_project(&deployment.db().pool, project.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn delete_project(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .hierarchy()
        .delete_project(&deployment.db().pool, project.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_members(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<ProjectMemberWithUser>>>, ApiError> {
    let members = deployment
        .membership()
        .list_project_members(&deployment.db().pool, project.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(members)))
}

pub async fn add_member(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<AddProjectMemberRequest>,
) -> Result<ResponseJson<ApiResponse<ProjectMemberWithUser>>, ApiError> {
    let member = deployment
        .membership()
        .add_project_member(
            &deployment.db().pool,
            project.id,
            payload.user_id,
            payload.role,
        )
        .await?;
    spawn_event_flush(&deployment);
    Ok(ResponseJson(ApiResponse::success(member)))
}

pub async fn update_member_role(
    State(deployment): State<DeploymentImpl>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateProjectMemberRequest>,
) -> Result<ResponseJson<ApiResponse<ProjectMember>>, ApiError> {
    let member = deployment
        .membership()
        .update_project_member_role(&deployment.db().pool, project_id, user_id, payload.role)
        .await?;
    Ok(ResponseJson(ApiResponse::success(member)))
}

pub async fn remove_member(
    State(deployment): State<DeploymentImpl>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .membership()
        .remove_project_member(&deployment.db().pool, project_id, user_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_sprints(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Sprint>>>, ApiError> {
    let sprints = deployment
        .sprints()
        .list(&deployment.db().pool, project.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(sprints)))
}

pub async fn create_sprint(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateSprint>,
) -> Result<ResponseJson<ApiResponse<Sprint>>, ApiError> {
    let sprint = deployment
        .sprints()
        .create(&deployment.db().pool, project.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(sprint)))
}

pub async fn get_labels(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Label>>>, ApiError> {
    let labels = deployment
        .hierarchy()
        .list_labels(&deployment.db().pool, project.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(labels)))
}

pub async fn create_label(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateLabel>,
) -> Result<ResponseJson<ApiResponse<Label>>, ApiError> {
    let label = deployment
        .hierarchy()
        .create_label(&deployment.db().pool, project.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(label)))
}

pub async fn get_tasks(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<TaskListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let filters = query.into_filters()?;
    let tasks = deployment
        .tasks()
        .list(&deployment.db().pool, project.id, &filters)
        .await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn create_task(
    Extension(user): Extension<AuthUser>,
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    tracing::debug!("Creating task '{}' in project {}", payload.title, project.id);
    let task = deployment
        .tasks()
        .create(&deployment.db().pool, project.id, user.id, &payload)
        .await?;
    if task.assignee_id.is_some() {
        spawn_event_flush(&deployment);
    }
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn get_backlog(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = deployment
        .tasks()
        .backlog(&deployment.db().pool, project.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn reorder_tasks(
    Extension(project): Extension<Project>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<ReorderTasksRequest>,
) -> Result<ResponseJson<ApiResponse<ReorderTasksResponse>>, ApiError> {
    let updated = deployment
        .tasks()
        .reorder(&deployment.db().pool, project.id, &payload.task_ids)
        .await?;
    Ok(ResponseJson(ApiResponse::success(ReorderTasksResponse {
        updated,
    })))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let project_id_router = Router::new()
        .route(
            "/",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/members", get(get_members).post(add_member))
        .route("/sprints", get(get_sprints).post(create_sprint))
        .route("/labels", get(get_labels).post(create_label))
        .route("/tasks", get(get_tasks).post(create_task))
        .route("/tasks/reorder", put(reorder_tasks))
        .route("/backlog", get(get_backlog))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_project_middleware::<DeploymentImpl>,
        ));

    let projects_router = Router::new()
        .route(
            "/{project_id}/members/{user_id}",
            put(update_member_role).delete(remove_member),
        )
        .nest("/{project_id}", project_id_router);

    Router::new().nest("/projects", projects_router)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use db::types::{TaskPriority, TaskStatus};
    use serde_json::json;

    use super::*;
    use crate::test_support::TestApp;

    #[test]
    fn task_query_parses_comma_separated_filters() {
        let query = TaskListQuery {
            status: Some("TODO, IN_PROGRESS".to_string()),
            priority: Some("HIGH".to_string()),
            search: Some("  ".to_string()),
            sort_by: Some(TaskSortField::Priority),
            ..TaskListQuery::default()
        };
        let filters = query.into_filters().unwrap();
        assert_eq!(filters.status, vec![TaskStatus::Todo, TaskStatus::InProgress]);
        assert_eq!(filters.priority, vec![TaskPriority::High]);
        assert_eq!(filters.search, None);
        assert_eq!(filters.sort_by, TaskSortField::Priority);
        assert_eq!(filters.sort_order, SortOrder::Asc);
    }

    #[test]
    fn task_query_rejects_unknown_enum_values() {
        let query = TaskListQuery {
            status: Some("SHIPPED".to_string()),
            ..TaskListQuery::default()
        };
        assert!(matches!(query.into_filters(), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn tasks_get_sequential_keys_and_assignment_notifies() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let bob = app.register("Bob", "bob@example.com").await;
        let project_id = app.project(&ada).await;
        let token = Some(ada.token.as_str());
        let tasks_uri = format!("/api/projects/{project_id}/tasks");

        let (status, body) = app
            .request(Method::POST, &tasks_uri, token, Some(json!({ "title": "first" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["key"], "ABC-1");
        assert_eq!(body["data"]["status"], "BACKLOG");
        assert_eq!(body["data"]["priority"], "MEDIUM");
        assert_eq!(body["data"]["task_type"], "TASK");

        let (_, body) = app
            .request(Method::POST, &tasks_uri, token, Some(json!({ "title": "second" })))
            .await;
        assert_eq!(body["data"]["key"], "ABC-2");
        let second_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .request(
                Method::PATCH,
                &format!("/api/tasks/{second_id}/assignee"),
                token,
                Some(json!({ "assignee_id": bob.id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        app.flush_events().await;
        let (_, body) = app
            .request(Method::GET, "/api/notifications", Some(&bob.token), None)
            .await;
        let notifications = body["data"].as_array().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["notification_type"], "TASK_ASSIGNED");

        let (_, body) = app
            .request(Method::GET, "/api/notifications", Some(&ada.token), None)
            .await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_and_reorder() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let project_id = app.project(&ada).await;
        let token = Some(ada.token.as_str());
        let tasks_uri = format!("/api/projects/{project_id}/tasks");

        let mut ids = Vec::new();
        for (title, status) in [("t1", "TODO"), ("t2", "DONE"), ("t3", "TODO")] {
            let (_, body) = app
                .request(
                    Method::POST,
                    &tasks_uri,
                    token,
                    Some(json!({ "title": title, "status": status })),
                )
                .await;
            ids.push(body["data"]["id"].as_str().unwrap().to_string());
        }

        let (_, body) = app
            .request(Method::GET, &format!("{tasks_uri}?status=TODO"), token, None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = app
            .request(Method::GET, &format!("{tasks_uri}?search=t2"), token, None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = app
            .request(Method::GET, &format!("{tasks_uri}?status=SHIPPED"), token, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .request(
                Method::PUT,
                &format!("{tasks_uri}/reorder"),
                token,
                Some(json!({ "task_ids": [ids[2], ids[0], ids[1]] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["updated"], 3);

        let (_, body) = app.request(Method::GET, &tasks_uri, token, None).await;
        let ordered: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|task| task["id"].as_str().unwrap())
            .collect();
        assert_eq!(ordered, vec![ids[2].as_str(), ids[0].as_str(), ids[1].as_str()]);

        let (_, body) = app
            .request(Method::GET, &format!("/api/projects/{project_id}/backlog"), token, None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn creator_leads_the_project_and_members_can_be_managed() {
        let app = TestApp::new().await;
        let ada = app.register("Ada", "ada@example.com").await;
        let bob = app.register("Bob", "bob@example.com").await;
        let project_id = app.project(&ada).await;
        let token = Some(ada.token.as_str());
        let members_uri = format!("/api/projects/{project_id}/members");

        let (_, body) = app.request(Method::GET, &members_uri, token, None).await;
        let members = body["data"].as_array().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0]["role"], "LEAD");

        let (status, _) = app
            .request(
                Method::POST,
                &members_uri,
                token,
                Some(json!({ "user_id": bob.id, "role": "MEMBER" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .request(
                Method::POST,
                &members_uri,
                token,
                Some(json!({ "user_id": Uuid::new_v4(), "role": "MEMBER" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .request(
                Method::PUT,
                &format!("{members_uri}/{}", bob.id),
                token,
                Some(json!({ "role": "VIEWER" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "VIEWER");

        let (status, _) = app
            .request(
                Method::PUT,
                &format!("{members_uri}/{}", Uuid::new_v4()),
                token,
                Some(json!({ "role": "VIEWER" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        app.flush_events().await;
        let (_, body) = app
            .request(Method::GET, "/api/notifications", Some(&bob.token), None)
            .await;
        assert_eq!(
            body["data"][0]["notification_type"],
            "PROJECT_INVITATION"
        );
    }
}
