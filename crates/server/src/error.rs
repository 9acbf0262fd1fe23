use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::DbErr;
use deployment::DeploymentError;
use services::services::{
    auth::AuthError, comment::CommentError, hierarchy::HierarchyError,
    membership::MembershipError, notification::NotificationError, sprint::SprintError,
    task::TaskError,
};
use thiserror::Error;
use utils_core::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Membership(#[from] MembershipError),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error(transparent)]
    Sprint(#[from] SprintError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Comment(#[from] CommentError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Auth(err) => match err {
                AuthError::AlreadyExists => (StatusCode::CONFLICT, "AuthError"),
                AuthError::InvalidCredentials | AuthError::InvalidToken => {
                    (StatusCode::UNAUTHORIZED, "AuthError")
                }
                AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "AuthError"),
                AuthError::NotFound => (StatusCode::NOT_FOUND, "AuthError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "AuthError"),
            },
            ApiError::Membership(err) => match err {
                MembershipError::NotFound(_) => (StatusCode::NOT_FOUND, "MembershipError"),
                MembershipError::AlreadyMember => (StatusCode::CONFLICT, "MembershipError"),
                MembershipError::Validation(_) => (StatusCode::BAD_REQUEST, "MembershipError"),
                MembershipError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "MembershipError")
                }
            },
            ApiError::Hierarchy(err) => match err {
                HierarchyError::NotFound(_) => (StatusCode::NOT_FOUND, "HierarchyError"),
                HierarchyError::AlreadyExists(_) => (StatusCode::CONFLICT, "HierarchyError"),
                HierarchyError::Validation(_) => (StatusCode::BAD_REQUEST, "HierarchyError"),
                HierarchyError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "HierarchyError"),
            },
            ApiError::Sprint(err) => match err {
                SprintError::NotFound(_) => (StatusCode::NOT_FOUND, "SprintError"),
                SprintError::InvalidTransition { .. } => (StatusCode::CONFLICT, "SprintError"),
                SprintError::Validation(_) => (StatusCode::BAD_REQUEST, "SprintError"),
                SprintError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SprintError"),
            },
            ApiError::Task(err) => match err {
                TaskError::NotFound(_) => (StatusCode::NOT_FOUND, "TaskError"),
                TaskError::Validation(_) => (StatusCode::BAD_REQUEST, "TaskError"),
                TaskError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TaskError"),
            },
            ApiError::Comment(err) => match err {
                CommentError::NotFound(_) => (StatusCode::NOT_FOUND, "CommentError"),
                CommentError::Unauthorized => (StatusCode::FORBIDDEN, "CommentError"),
                CommentError::Validation(_) => (StatusCode::BAD_REQUEST, "CommentError"),
                CommentError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CommentError"),
            },
            ApiError::Notification(err) => match err {
                NotificationError::NotFound => (StatusCode::NOT_FOUND, "NotificationError"),
                NotificationError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "NotificationError")
                }
            },
            ApiError::Deployment(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DeploymentError"),
            ApiError::Database(db_err) => match db_err {
                DbErr::RecordNotFound(_) => (StatusCode::NOT_FOUND, "DatabaseError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            },
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = self.status_and_type();

        let error_message = match &self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg.clone(),
            _ if status_code.is_server_error() => format!("{}: {}", error_type, self),
            _ => self.to_string(),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}
