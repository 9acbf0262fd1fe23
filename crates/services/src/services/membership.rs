use db::{
    DbErr,
    events::{EVENT_PROJECT_MEMBER_ADDED, EVENT_WORKSPACE_MEMBER_ADDED, MemberAddedPayload},
    models::{
        event_outbox::EventOutbox,
        project::Project,
        project_member::{ProjectMember, ProjectMemberWithUser},
        user::User,
        workspace::Workspace,
        workspace_member::{WorkspaceMember, WorkspaceMemberWithUser},
    },
    types::{ProjectRole, WorkspaceRole},
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("User is already a member")]
    AlreadyMember,
    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, MembershipError>;

fn ensure_assignable(role: WorkspaceRole) -> Result<()> {
    if role == WorkspaceRole::Owner {
        return Err(MembershipError::Validation(
            "The OWNER role cannot be assigned".to_string(),
        ));
    }
    Ok(())
}

/// Workspace and project membership. The two scopes are independent: a
/// workspace role grants nothing inside its projects.
#[derive(Clone, Default)]
pub struct MembershipService;

impl MembershipService {
    pub fn new() -> Self {
        Self
    }

    async fn workspace(&self, pool: &db::DbPool, workspace_id: Uuid) -> Result<Workspace> {
        Workspace::find_by_id(pool, workspace_id)
            .await?
            .ok_or(MembershipError::NotFound("Workspace"))
    }

    async fn project(&self, pool: &db::DbPool, project_id: Uuid) -> Result<Project> {
        Project::find_by_id(pool, project_id)
            .await?
            .ok_or(MembershipError::NotFound("Project"))
    }

    pub async fn list_workspace_members(
        &self,
        pool: &db::DbPool,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceMemberWithUser>> {
        self.workspace(pool, workspace_id).await?;
        Ok(WorkspaceMember::list_with_users(pool, workspace_id).await?)
    }

    /// Invites a registered user by email.
    pub async fn add_workspace_member(
        &self,
        pool: &db::DbPool,
        workspace_id: Uuid,
        email: &str,
        role: WorkspaceRole,
    ) -> Result<WorkspaceMemberWithUser> {
        ensure_assignable(role)?;
        let workspace = self.workspace(pool, workspace_id).await?;
        let user = User::find_by_email(pool, &email.trim().to_lowercase())
            .await?
            .ok_or(MembershipError::NotFound("User"))?;
        if WorkspaceMember::find(pool, workspace_id, user.id)
            .await?
            .is_some()
        {
            return Err(MembershipError::AlreadyMember);
        }

        let tx = db::begin_write(pool).await?;
        let member = WorkspaceMember::create(&tx, workspace_id, user.id, role).await?;
        EventOutbox::enqueue_payload(
            &tx,
            EVENT_WORKSPACE_MEMBER_ADDED,
            "workspace",
            workspace_id,
            &MemberAddedPayload {
                scope_id: workspace_id,
                user_id: user.id,
                scope_name: workspace.name,
                role: role.to_string(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(workspace_id = %workspace_id, user_id = %user.id, %role, "workspace member added");
        Ok(WorkspaceMemberWithUser { member, user })
    }

    pub async fn update_workspace_member_role(
        &self,
        pool: &db::DbPool,
        workspace_id: Uuid,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> Result<WorkspaceMember> {
        ensure_assignable(role)?;
        let workspace = self.workspace(pool, workspace_id).await?;
        if workspace.owner_id == user_id {
            return Err(MembershipError::Validation(
                "The workspace owner's role cannot be changed".to_string(),
            ));
        }
        match WorkspaceMember::update_role(pool, workspace_id, user_id, role).await {
            Ok(Some(member)) => Ok(member),
            Ok(None) | Err(DbErr::RecordNotFound(_)) => Err(MembershipError::NotFound("Member")),
            Err(err) => Err(err.into()),
        }
    }

    /// Removing someone who is not a member is a no-op.
    pub async fn remove_workspace_member(
        &self,
        pool: &db::DbPool,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<()> {
        let workspace = self.workspace(pool, workspace_id).await?;
        if workspace.owner_id == user_id {
            return Err(MembershipError::Validation(
                "The workspace owner cannot be removed".to_string(),
            ));
        }
        match WorkspaceMember::delete(pool, workspace_id, user_id).await {
            Ok(_) | Err(DbErr::RecordNotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_project_members(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMemberWithUser>> {
        self.project(pool, project_id).await?;
        Ok(ProjectMember::list_with_users(pool, project_id).await?)
    }

    pub async fn add_project_member(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<ProjectMemberWithUser> {
        let project = self.project(pool, project_id).await?;
        let user = User::find_by_id(pool, user_id)
            .await?
            .ok_or(MembershipError::NotFound("User"))?;
        if ProjectMember::find(pool, project_id, user_id).await?.is_some() {
            return Err(MembershipError::AlreadyMember);
        }

        let tx = db::begin_write(pool).await?;
        let member = ProjectMember::create(&tx, project_id, user_id, role).await?;
        EventOutbox::enqueue_payload(
            &tx,
            EVENT_PROJECT_MEMBER_ADDED,
            "project",
            project_id,
            &MemberAddedPayload {
                scope_id: project_id,
                user_id,
                scope_name: project.name,
                role: role.to_string(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(project_id = %project_id, user_id = %user_id, %role, "project member added");
        Ok(ProjectMemberWithUser { member, user })
    }

    pub async fn update_project_member_role(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<ProjectMember> {
        self.project(pool, project_id).await?;
        match ProjectMember::update_role(pool, project_id, user_id, role).await {
            Ok(Some(member)) => Ok(member),
            Ok(None) | Err(DbErr::RecordNotFound(_)) => Err(MembershipError::NotFound("Member")),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn remove_project_member(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<()> {
        self.project(pool, project_id).await?;
        match ProjectMember::delete(pool, project_id, user_id).await {
            Ok(_) | Err(DbErr::RecordNotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            event_outbox::EventOutbox,
            project::CreateProject,
            space::{CreateSpace, Space},
            user::CreateUser,
            workspace::CreateWorkspace,
        },
        types::UserStatus,
    };

    use super::*;

    async fn user(db: &DBService, email: &str) -> User {
        User::create(
            &db.pool,
            &CreateUser {
                email: email.to_string(),
                name: email.to_string(),
                password_hash: "x".to_string(),
                status: UserStatus::Online,
            },
        )
        .await
        .unwrap()
    }

    async fn workspace(db: &DBService, owner: &User) -> Workspace {
        let workspace = Workspace::create(
            &db.pool,
            &CreateWorkspace {
                name: "Acme".to_string(),
                description: None,
                icon: None,
                color: None,
            },
            owner.id,
        )
        .await
        .unwrap();
        WorkspaceMember::create(&db.pool, workspace.id, owner.id, WorkspaceRole::Owner)
            .await
            .unwrap();
        workspace
    }

    #[tokio::test]
    async fn add_by_email_then_duplicate_is_rejected() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = MembershipService::new();
        let owner = user(&db, "owner@example.com").await;
        let bob = user(&db, "bob@example.com").await;
        let ws = workspace(&db, &owner).await;

        let added = service
            .add_workspace_member(&db.pool, ws.id, "BOB@example.com", WorkspaceRole::Member)
            .await
            .unwrap();
        assert_eq!(added.user.id, bob.id);
        assert_eq!(added.member.role, WorkspaceRole::Member);

        let err = service
            .add_workspace_member(&db.pool, ws.id, "bob@example.com", WorkspaceRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::AlreadyMember));

        let events = EventOutbox::fetch_unpublished(&db.pool, 10, 5).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EVENT_WORKSPACE_MEMBER_ADDED);
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = MembershipService::new();
        let owner = user(&db, "owner@example.com").await;
        let ws = workspace(&db, &owner).await;

        let err = service
            .add_workspace_member(&db.pool, ws.id, "ghost@example.com", WorkspaceRole::Member)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::NotFound("User")));
    }

    #[tokio::test]
    async fn owner_role_is_protected() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = MembershipService::new();
        let owner = user(&db, "owner@example.com").await;
        let bob = user(&db, "bob@example.com").await;
        let ws = workspace(&db, &owner).await;

        let err = service
            .add_workspace_member(&db.pool, ws.id, "bob@example.com", WorkspaceRole::Owner)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::Validation(_)));

        let err = service
            .remove_workspace_member(&db.pool, ws.id, owner.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::Validation(_)));

        let err = service
            .update_workspace_member_role(&db.pool, ws.id, bob.id, WorkspaceRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::NotFound("Member")));
    }

    #[tokio::test]
    async fn removing_is_idempotent() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = MembershipService::new();
        let owner = user(&db, "owner@example.com").await;
        let bob = user(&db, "bob@example.com").await;
        let ws = workspace(&db, &owner).await;

        service
            .remove_workspace_member(&db.pool, ws.id, bob.id)
            .await
            .unwrap();

        service
            .add_workspace_member(&db.pool, ws.id, "bob@example.com", WorkspaceRole::Viewer)
            .await
            .unwrap();
        service
            .remove_workspace_member(&db.pool, ws.id, bob.id)
            .await
            .unwrap();

        let members = service
            .list_workspace_members(&db.pool, ws.id)
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user.id, owner.id);
    }

    #[tokio::test]
    async fn project_members_are_independent_of_workspace_roles() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = MembershipService::new();
        let owner = user(&db, "owner@example.com").await;
        let bob = user(&db, "bob@example.com").await;
        let ws = workspace(&db, &owner).await;
        let space = Space::create(
            &db.pool,
            ws.id,
            &CreateSpace {
                name: "Eng".to_string(),
                description: None,
                icon: None,
                color: None,
            },
        )
        .await
        .unwrap();
        let project = Project::create(
            &db.pool,
            space.id,
            &CreateProject {
                name: "Tracker".to_string(),
                key: "TRK".to_string(),
                description: None,
                icon: None,
                color: None,
                lead_id: None,
            },
        )
        .await
        .unwrap();

        assert!(
            service
                .list_project_members(&db.pool, project.id)
                .await
                .unwrap()
                .is_empty()
        );

        service
            .add_project_member(&db.pool, project.id, bob.id, ProjectRole::Member)
            .await
            .unwrap();
        let updated = service
            .update_project_member_role(&db.pool, project.id, bob.id, ProjectRole::Lead)
            .await
            .unwrap();
        assert_eq!(updated.role, ProjectRole::Lead);

        let err = service
            .add_project_member(&db.pool, project.id, Uuid::new_v4(), ProjectRole::Member)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::NotFound("User")));
    }
}
