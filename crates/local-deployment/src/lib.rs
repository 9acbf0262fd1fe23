use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    auth::AuthService,
    comment::CommentService,
    config::Config,
    events::{EventService, NotificationSink, StoredNotificationSink},
    hierarchy::HierarchyService,
    membership::MembershipService,
    notification::NotificationService,
    scheduler::SchedulerService,
    sprint::SprintService,
    task::TaskService,
};
use tokio::task::JoinHandle;
use utils_jwt::JwtKeys;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<Config>,
    db: DBService,
    auth: AuthService,
    hierarchy: HierarchyService,
    membership: MembershipService,
    sprints: SprintService,
    tasks: TaskService,
    comments: CommentService,
    notifications: NotificationService,
    events: EventService,
    scheduler: SchedulerService,
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

struct CoreServices {
    auth: AuthService,
    hierarchy: HierarchyService,
    membership: MembershipService,
    sprints: SprintService,
    tasks: TaskService,
    comments: CommentService,
    notifications: NotificationService,
}

struct RuntimeServices {
    db: DBService,
    events: EventService,
    scheduler: SchedulerService,
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let config = Config::from_env()?;
        let deployment = Self::from_config(config).await?;
        deployment.start_background_workers();
        Ok(deployment)
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn auth(&self) -> &AuthService {
        &self.auth
    }

    fn hierarchy(&self) -> &HierarchyService {
        &self.hierarchy
    }

    fn membership(&self) -> &MembershipService {
        &self.membership
    }

    fn sprints(&self) -> &SprintService {
        &self.sprints
    }

    fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    fn comments(&self) -> &CommentService {
        &self.comments
    }

    fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    fn events(&self) -> &EventService {
        &self.events
    }
}

impl LocalDeployment {
    /// Builds every service without spawning the outbox worker or the
    /// scheduler. Tests use this and flush events explicitly.
    pub async fn from_config(config: Config) -> Result<Self, DeploymentError> {
        config.validate()?;
        let core = Self::build_core_services(&config);
        let runtime = Self::build_runtime_services(&config).await?;

        let CoreServices {
            auth,
            hierarchy,
            membership,
            sprints,
            tasks,
            comments,
            notifications,
        } = core;

        let RuntimeServices {
            db,
            events,
            scheduler,
        } = runtime;

        tracing::info!(
            environment = %config.environment,
            scheduler_enabled = config.scheduler_enabled,
            "deployment ready"
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            auth,
            hierarchy,
            membership,
            sprints,
            tasks,
            comments,
            notifications,
            events,
            scheduler,
            background: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn build_core_services(config: &Config) -> CoreServices {
        let keys = JwtKeys::new(&config.jwt_secret, config.jwt_expiry);
        CoreServices {
            auth: AuthService::new(keys, config.refresh_expiry),
            hierarchy: HierarchyService::new(),
            membership: MembershipService::new(),
            sprints: SprintService::new(),
            tasks: TaskService::new(),
            comments: CommentService::new(),
            notifications: NotificationService::new(),
        }
    }

    async fn build_runtime_services(config: &Config) -> Result<RuntimeServices, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;
        let sink: Arc<dyn NotificationSink> = Arc::new(StoredNotificationSink::new(db.clone()));
        let events = EventService::new(db.clone(), sink.clone());
        let scheduler = SchedulerService::new(
            db.clone(),
            sink,
            config.notification_retention_days,
            config.inactive_user_minutes,
        );
        Ok(RuntimeServices {
            db,
            events,
            scheduler,
        })
    }

    /// Spawns the outbox worker and, when enabled, the scheduled jobs.
    pub fn start_background_workers(&self) {
        let mut handles = vec![self.events.spawn_outbox_worker()];
        if self.config.scheduler_enabled {
            handles.extend(self.scheduler.spawn_jobs());
        } else {
            tracing::info!("scheduler disabled");
        }
        tracing::info!(workers = handles.len(), "background workers started");

        match self.background.lock() {
            Ok(mut background) => background.extend(handles),
            Err(poisoned) => poisoned.into_inner().extend(handles),
        }
    }

    pub fn scheduler(&self) -> &SchedulerService {
        &self.scheduler
    }

    /// Aborts every background worker. Safe to call more than once.
    pub fn shutdown_background_workers(&self) {
        let handles = match self.background.lock() {
            Ok(mut background) => std::mem::take(&mut *background),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in &handles {
            handle.abort();
        }
        if !handles.is_empty() {
            tracing::info!(workers = handles.len(), "background workers stopped");
        }
    }

    pub fn background_worker_count(&self) -> usize {
        match self.background.lock() {
            Ok(background) => background.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
