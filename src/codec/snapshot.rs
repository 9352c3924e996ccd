use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::entities::{
    decode_activity, decode_project, decode_sprint, decode_task, decode_team_member,
    encode_activity, encode_project, encode_sprint, encode_task, encode_team_member,
};
use super::records::{BurndownRecord, SnapshotRecord, TaskRecord, VelocityRecord};
use super::{format_timestamp, parse_timestamp, parse_uuid, to_sorted_json, PathCodec};
use crate::entity::{BurndownPoint, Project, ProjectPatch, Snapshot, Task, VelocityPoint};
use crate::error::{Result, SyncError};

/// Keys of `project.json` that are computed and therefore never patched.
const DERIVED_KEYS: [&str; 4] = ["activeSprint", "totalTasks", "doneTasks", "progress"];

pub fn encode_snapshot(snapshot: &Snapshot, paths: &PathCodec) -> Result<Vec<u8>> {
    let record = SnapshotRecord {
        timestamp: format_timestamp(&snapshot.timestamp),
        projects: snapshot
            .projects
            .iter()
            .map(|p| encode_project(p, paths))
            .collect(),
        tasks: snapshot.tasks.iter().map(encode_task).collect(),
        sprints: snapshot.sprints.iter().map(encode_sprint).collect(),
        velocity_data: snapshot
            .velocity_data
            .iter()
            .map(|v| VelocityRecord {
                sprint: v.sprint.clone(),
                planned: v.planned,
                completed: v.completed,
            })
            .collect(),
        activities: snapshot.activities.iter().map(encode_activity).collect(),
        team_members: snapshot.team_members.iter().map(encode_team_member).collect(),
        burndown_ideal: encode_burndown(&snapshot.burndown_ideal),
        burndown_actual: encode_burndown(&snapshot.burndown_actual),
    };
    to_sorted_json(&record)
}

pub fn decode_snapshot(bytes: &[u8], paths: &PathCodec) -> Result<Snapshot> {
    let record: SnapshotRecord = serde_json::from_slice(bytes)?;

    Ok(Snapshot {
        timestamp: parse_timestamp("timestamp", &record.timestamp)?,
        projects: record
            .projects
            .into_iter()
            .map(|p| decode_project(p, paths))
            .collect::<Result<_>>()?,
        tasks: record
            .tasks
            .into_iter()
            .map(decode_task)
            .collect::<Result<_>>()?,
        sprints: record
            .sprints
            .into_iter()
            .map(decode_sprint)
            .collect::<Result<_>>()?,
        velocity_data: record
            .velocity_data
            .into_iter()
            .map(|v| VelocityPoint {
                sprint: v.sprint,
                planned: v.planned,
                completed: v.completed,
            })
            .collect(),
        activities: record
            .activities
            .into_iter()
            .map(decode_activity)
            .collect::<Result<_>>()?,
        team_members: record
            .team_members
            .into_iter()
            .map(decode_team_member)
            .collect::<Result<_>>()?,
        burndown_ideal: decode_burndown(record.burndown_ideal),
        burndown_actual: decode_burndown(record.burndown_actual),
    })
}

fn encode_burndown(points: &[BurndownPoint]) -> Vec<BurndownRecord> {
    points
        .iter()
        .map(|p| BurndownRecord {
            day: p.day.clone(),
            remaining: p.remaining,
        })
        .collect()
}

fn decode_burndown(records: Vec<BurndownRecord>) -> Vec<BurndownPoint> {
    records
        .into_iter()
        .map(|r| BurndownPoint {
            day: r.day,
            remaining: r.remaining,
        })
        .collect()
}

/// Bridge `tasks.json`: a bare array of task records.
pub fn encode_task_list<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Result<Vec<u8>> {
    let records: Vec<TaskRecord> = tasks.into_iter().map(encode_task).collect();
    to_sorted_json(&records)
}

pub fn decode_task_list(bytes: &[u8]) -> Result<Vec<Task>> {
    let records: Vec<TaskRecord> = serde_json::from_slice(bytes)?;
    records.into_iter().map(decode_task).collect()
}

/// Bridge `project.json`, written with the full project encoding.
pub fn encode_project_file(project: &Project, paths: &PathCodec) -> Result<Vec<u8>> {
    to_sorted_json(&encode_project(project, paths))
}

/// Read a `project.json` as a sparse patch.
///
/// Only keys present in the file (and not `null`) end up in the patch.
/// `id` is mandatory. When the file carries no `lastModified`, `file_clock`
/// (normally the file's mtime) stands in for it.
pub fn decode_project_patch(
    bytes: &[u8],
    file_clock: DateTime<Utc>,
    paths: &PathCodec,
) -> Result<ProjectPatch> {
    let value: Value = serde_json::from_slice(bytes)?;
    let obj = value
        .as_object()
        .ok_or_else(|| SyncError::decode("project.json: expected an object"))?;

    let id = match obj.get("id") {
        Some(Value::String(id)) => parse_uuid("project.id", id)?,
        _ => return Err(SyncError::decode("project.json: missing id")),
    };
    let last_modified = match opt_string(obj, "lastModified")? {
        Some(ts) => parse_timestamp("project.lastModified", &ts)?,
        None => file_clock,
    };

    let mut patch = ProjectPatch::new(id, last_modified);
    patch.name = opt_string(obj, "name")?;
    patch.summary = opt_string(obj, "summary")?;
    patch.icon = opt_string(obj, "icon")?;
    patch.language = opt_string(obj, "language")?;
    patch.version = opt_string(obj, "version")?;
    patch.color = opt_string(obj, "color")?
        .map(|hex| {
            hex.parse()
                .map_err(|_| SyncError::decode(format!("project.color: invalid color '{}'", hex)))
        })
        .transpose()?;
    patch.source_path = opt_string(obj, "sourcePath")?.map(|p| {
        if p.is_empty() {
            PathBuf::new()
        } else {
            paths.decode(&p)
        }
    });

    for key in DERIVED_KEYS {
        if obj.contains_key(key) {
            tracing::trace!(key, "ignoring derived key in project.json");
        }
    }

    Ok(patch)
}

fn opt_string(obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SyncError::decode(format!(
            "project.{}: expected a string, found {}",
            key, other
        ))),
    }
}
