use deployment::Deployment;

use crate::DeploymentImpl;

pub mod auth;
pub mod comments;
pub mod health;
pub mod labels;
pub mod notifications;
pub mod projects;
pub mod spaces;
pub mod sprints;
pub mod tasks;
pub mod users;
pub mod workspaces;

/// Dispatches outbox rows written by the request without making the caller
/// wait for notification delivery.
pub(crate) fn spawn_event_flush(deployment: &DeploymentImpl) {
    let deployment = deployment.clone();
    tokio::spawn(async move {
        deployment.flush_events().await;
    });
}
