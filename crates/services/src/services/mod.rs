pub mod auth;
pub mod comment;
pub mod config;
pub mod events;
pub mod hierarchy;
pub mod membership;
pub mod notification;
pub mod scheduler;
pub mod sprint;
pub mod task;
