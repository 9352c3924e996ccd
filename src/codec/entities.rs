use chrono::Utc;
use uuid::Uuid;

use super::records::{ActivityRecord, ProjectRecord, SprintRecord, TaskRecord, TeamMemberRecord};
use super::{format_date, format_timestamp, parse_date, parse_timestamp, parse_uuid, PathCodec};
use crate::entity::{
    Activity, Color, DerivedFields, Project, Sprint, Task, TaskPriority, TaskStatus, TeamMember,
};
use crate::error::{Result, SyncError};

fn parse_color(field: &str, value: Option<&str>) -> Result<Color> {
    match value {
        None => Ok(Color::default()),
        Some(hex) => hex
            .parse()
            .map_err(|_| SyncError::decode(format!("{}: invalid color '{}'", field, hex))),
    }
}

/// Task fields:
/// - `id`: canonical UUID string; assigned fresh when missing
/// - `status`, `priority`: lowercase names
/// - `projectId`: UUID string, omitted when unlinked
/// - `dueDate`: `YYYY-MM-DD`
/// - `createdAt`, `updatedAt`: RFC 3339 UTC
pub fn encode_task(task: &Task) -> TaskRecord {
    TaskRecord {
        id: Some(task.id.to_string()),
        title: task.title.clone(),
        detail: task.detail.clone(),
        status: task.status.to_string(),
        priority: task.priority.to_string(),
        project_id: task.project_id.map(|id| id.to_string()),
        sprint: task.sprint.clone(),
        assignee: task.assignee.clone(),
        due_date: task.due_date.as_ref().map(format_date),
        tags: task.tags.clone(),
        created_at: Some(format_timestamp(&task.created_at)),
        updated_at: Some(format_timestamp(&task.updated_at)),
    }
}

pub fn decode_task(record: TaskRecord) -> Result<Task> {
    let id = match record.id.as_deref() {
        Some(id) => parse_uuid("task.id", id)?,
        None => Uuid::new_v4(),
    };
    let status: TaskStatus = record.status.parse().map_err(SyncError::Decode)?;
    let priority: TaskPriority = record.priority.parse().map_err(SyncError::Decode)?;
    let project_id = record
        .project_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| parse_uuid("task.projectId", s))
        .transpose()?;
    let due_date = record
        .due_date
        .as_deref()
        .map(|s| parse_date("task.dueDate", s))
        .transpose()?;
    let created_at = match record.created_at.as_deref() {
        Some(ts) => parse_timestamp("task.createdAt", ts)?,
        None => Utc::now(),
    };
    let updated_at = match record.updated_at.as_deref() {
        Some(ts) => parse_timestamp("task.updatedAt", ts)?,
        None => created_at,
    };

    Ok(Task {
        id,
        title: record.title,
        detail: record.detail,
        status,
        priority,
        project_id,
        sprint: record.sprint,
        assignee: record.assignee,
        due_date,
        tags: record.tags,
        created_at,
        updated_at,
    })
}

/// Project fields:
/// - `color`: six hex digits
/// - `sourcePath`: `~`-relative when under the home directory
/// - `activeSprint`, `totalTasks`, `doneTasks`, `progress`: derived, written
///   for readers but recomputed after every load
pub fn encode_project(project: &Project, paths: &PathCodec) -> ProjectRecord {
    ProjectRecord {
        id: project.id.to_string(),
        name: project.name.clone(),
        summary: project.summary.clone(),
        color: Some(project.color.to_hex()),
        icon: project.icon.clone(),
        source_path: project.source_path.as_deref().map(|p| paths.encode(p)),
        language: project.language.clone(),
        version: project.version.clone(),
        legacy_sprint: project.legacy_sprint.clone(),
        created_at: Some(format_timestamp(&project.created_at)),
        last_modified: Some(format_timestamp(&project.last_modified)),
        active_sprint: project.derived.active_sprint.clone(),
        total_tasks: project.derived.total_tasks,
        done_tasks: project.derived.done_tasks,
        progress: project.derived.progress,
    }
}

pub fn decode_project(record: ProjectRecord, paths: &PathCodec) -> Result<Project> {
    let id = parse_uuid("project.id", &record.id)?;
    let created_at = match record.created_at.as_deref() {
        Some(ts) => parse_timestamp("project.createdAt", ts)?,
        None => Utc::now(),
    };
    let last_modified = match record.last_modified.as_deref() {
        Some(ts) => parse_timestamp("project.lastModified", ts)?,
        None => created_at,
    };

    Ok(Project {
        id,
        name: record.name,
        summary: record.summary,
        color: parse_color("project.color", record.color.as_deref())?,
        icon: record.icon,
        source_path: record.source_path.as_deref().map(|p| paths.decode(p)),
        language: record.language,
        version: record.version,
        legacy_sprint: record.legacy_sprint.filter(|s| !s.is_empty()),
        created_at,
        last_modified,
        derived: DerivedFields {
            active_sprint: record.active_sprint,
            total_tasks: record.total_tasks,
            done_tasks: record.done_tasks,
            progress: record.progress,
        },
    })
}

pub fn encode_sprint(sprint: &Sprint) -> SprintRecord {
    SprintRecord {
        id: sprint.id.to_string(),
        project_id: sprint.project_id.to_string(),
        name: sprint.name.clone(),
        goal: sprint.goal.clone(),
        is_active: sprint.is_active,
        is_hidden: sprint.is_hidden,
        start_date: format_date(&sprint.start_date),
        end_date: format_date(&sprint.end_date),
    }
}

pub fn decode_sprint(record: SprintRecord) -> Result<Sprint> {
    Ok(Sprint {
        id: parse_uuid("sprint.id", &record.id)?,
        project_id: parse_uuid("sprint.projectId", &record.project_id)?,
        name: record.name,
        goal: record.goal,
        is_active: record.is_active,
        is_hidden: record.is_hidden,
        start_date: parse_date("sprint.startDate", &record.start_date)?,
        end_date: parse_date("sprint.endDate", &record.end_date)?,
    })
}

pub fn encode_team_member(member: &TeamMember) -> TeamMemberRecord {
    TeamMemberRecord {
        id: member.id.to_string(),
        name: member.name.clone(),
        role: member.role.clone(),
        color: Some(member.color.to_hex()),
    }
}

pub fn decode_team_member(record: TeamMemberRecord) -> Result<TeamMember> {
    Ok(TeamMember {
        id: parse_uuid("teamMember.id", &record.id)?,
        name: record.name,
        role: record.role,
        color: parse_color("teamMember.color", record.color.as_deref())?,
    })
}

pub fn encode_activity(activity: &Activity) -> ActivityRecord {
    ActivityRecord {
        id: activity.id.to_string(),
        timestamp: format_timestamp(&activity.timestamp),
        message: activity.message.clone(),
        project_id: activity.project_id.map(|id| id.to_string()),
    }
}

pub fn decode_activity(record: ActivityRecord) -> Result<Activity> {
    Ok(Activity {
        id: parse_uuid("activity.id", &record.id)?,
        timestamp: parse_timestamp("activity.timestamp", &record.timestamp)?,
        message: record.message,
        project_id: record
            .project_id
            .as_deref()
            .map(|s| parse_uuid("activity.projectId", s))
            .transpose()?,
    })
}
