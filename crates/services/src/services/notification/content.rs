use db::{models::notification::CreateNotification, types::NotificationType};
use serde_json::json;
use uuid::Uuid;

pub fn task_assigned(user_id: Uuid, task_id: Uuid, project_id: Uuid, title: &str) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::TaskAssigned,
        title: "Task Assigned".to_string(),
        message: format!("You have been assigned to task: {title}"),
        data: json!({ "task_id": task_id, "project_id": project_id }),
    }
}

pub fn task_commented(
    user_id: Uuid,
    task_id: Uuid,
    comment_id: Uuid,
    title: &str,
) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::TaskCommented,
        title: "New Comment".to_string(),
        message: format!("New comment on task: {title}"),
        data: json!({ "task_id": task_id, "comment_id": comment_id }),
    }
}

pub fn sprint_started(user_id: Uuid, sprint_id: Uuid, project_id: Uuid, name: &str) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::SprintStarted,
        title: "Sprint Started".to_string(),
        message: format!("Sprint has started: {name}"),
        data: json!({ "sprint_id": sprint_id, "project_id": project_id }),
    }
}

pub fn sprint_completed(
    user_id: Uuid,
    sprint_id: Uuid,
    project_id: Uuid,
    name: &str,
) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::SprintCompleted,
        title: "Sprint Completed".to_string(),
        message: format!("Sprint has been completed: {name}"),
        data: json!({ "sprint_id": sprint_id, "project_id": project_id }),
    }
}

pub fn sprint_ending(user_id: Uuid, sprint_id: Uuid, project_id: Uuid, name: &str) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::SprintEnding,
        title: "Sprint Ending Soon".to_string(),
        message: format!("Sprint ends within a day: {name}"),
        data: json!({ "sprint_id": sprint_id, "project_id": project_id }),
    }
}

pub fn workspace_invitation(
    user_id: Uuid,
    workspace_id: Uuid,
    name: &str,
    role: &str,
) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::WorkspaceInvitation,
        title: "Workspace Invitation".to_string(),
        message: format!("You have been invited to workspace: {name}"),
        data: json!({ "workspace_id": workspace_id, "role": role }),
    }
}

pub fn project_invitation(user_id: Uuid, project_id: Uuid, name: &str, role: &str) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::ProjectInvitation,
        title: "Project Invitation".to_string(),
        message: format!("You have been invited to project: {name}"),
        data: json!({ "project_id": project_id, "role": role }),
    }
}

fn due_phrase(days_left: i64) -> String {
    match days_left {
        i64::MIN..=0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n} days"),
    }
}

/// Reminder for a task due in `days_left` whole days.
pub fn due_date_reminder(
    user_id: Uuid,
    task_id: Uuid,
    project_id: Uuid,
    title: &str,
    days_left: i64,
) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::DueDateReminder,
        title: "Due Date Reminder".to_string(),
        message: format!("Task is due {}: {title}", due_phrase(days_left)),
        data: json!({
            "task_id": task_id,
            "project_id": project_id,
            "days_left": days_left.max(0),
            "is_overdue": false,
        }),
    }
}

pub fn overdue_reminder(user_id: Uuid, task_id: Uuid, project_id: Uuid, title: &str) -> CreateNotification {
    CreateNotification {
        user_id,
        notification_type: NotificationType::DueDateReminder,
        title: "Overdue Task".to_string(),
        message: format!("Task is overdue: {title}"),
        data: json!({ "task_id": task_id, "project_id": project_id, "is_overdue": true }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_messages_name_the_distance() {
        let user = Uuid::new_v4();
        let task = Uuid::new_v4();
        let project = Uuid::new_v4();
        let message = |days| due_date_reminder(user, task, project, "Ship", days).message;
        assert_eq!(message(0), "Task is due today: Ship");
        assert_eq!(message(1), "Task is due tomorrow: Ship");
        assert_eq!(message(3), "Task is due in 3 days: Ship");
    }

    #[test]
    fn overdue_reminders_are_flagged() {
        let reminder = overdue_reminder(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "Ship");
        assert_eq!(reminder.title, "Overdue Task");
        assert_eq!(reminder.data["is_overdue"], json!(true));
        assert_eq!(reminder.notification_type, NotificationType::DueDateReminder);
    }
}
