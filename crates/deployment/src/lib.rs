use async_trait::async_trait;
use db::{DBService, DbErr};
use services::services::{
    auth::AuthService,
    comment::CommentService,
    config::{Config, ConfigError},
    events::EventService,
    hierarchy::HierarchyService,
    membership::MembershipService,
    notification::NotificationService,
    sprint::SprintService,
    task::TaskService,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything a request handler needs. The HTTP layer is written against this
/// trait so tests and alternative runtimes can wire their own services.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &Config;

    fn db(&self) -> &DBService;

    fn auth(&self) -> &AuthService;

    fn hierarchy(&self) -> &HierarchyService;

    fn membership(&self) -> &MembershipService;

    fn sprints(&self) -> &SprintService;

    fn tasks(&self) -> &TaskService;

    fn comments(&self) -> &CommentService;

    fn notifications(&self) -> &NotificationService;

    fn events(&self) -> &EventService;

    /// Dispatches queued domain events right away instead of waiting for the
    /// outbox worker. Failures are logged.
    async fn flush_events(&self) {
        if let Err(err) = self.events().flush_pending().await {
            tracing::warn!(error = %err, "failed to flush pending events");
        }
    }
}
