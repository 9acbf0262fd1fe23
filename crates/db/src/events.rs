use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_TASK_ASSIGNED: &str = "task.assigned";
pub const EVENT_TASK_COMMENTED: &str = "task.commented";

pub const EVENT_SPRINT_STARTED: &str = "sprint.started";
pub const EVENT_SPRINT_COMPLETED: &str = "sprint.completed";

pub const EVENT_WORKSPACE_MEMBER_ADDED: &str = "workspace.member_added";
pub const EVENT_PROJECT_MEMBER_ADDED: &str = "project.member_added";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignedPayload {
    pub task_id: Uuid,
    pub project_id: Uuid,
    pub assignee_id: Uuid,
    pub actor_id: Uuid,
    pub title: String,
}

/// Recipients are captured when the comment is written so later reassignment
/// does not change who hears about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCommentedPayload {
    pub task_id: Uuid,
    pub comment_id: Uuid,
    pub author_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintEventPayload {
    pub sprint_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberAddedPayload {
    pub scope_id: Uuid,
    pub user_id: Uuid,
    pub scope_name: String,
    pub role: String,
}
