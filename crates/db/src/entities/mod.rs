pub mod comment;
pub mod event_outbox;
pub mod label;
pub mod notification;
pub mod project;
pub mod project_member;
pub mod refresh_token;
pub mod space;
pub mod sprint;
pub mod task;
pub mod task_label;
pub mod user;
pub mod workspace;
pub mod workspace_member;
