//! `_schema.json`: a description of the bridge files for people and tools
//! editing them by hand. Written once, never read back.

use serde_json::json;

use crate::codec::records::TaskRecord;
use crate::codec::{encode_task, to_sorted_json};
use crate::entity::{Task, TaskPriority, TaskStatus};
use crate::error::Result;

const PATCH_FIELDS: [&str; 8] = [
    "name",
    "summary",
    "color",
    "icon",
    "sourcePath",
    "language",
    "version",
    "lastModified",
];

fn example_task() -> Task {
    let mut task = Task::new("Write the release notes", None);
    task.detail = "Summarize the changes since the last tag".to_string();
    task.status = TaskStatus::InProgress;
    task.priority = TaskPriority::High;
    task.tags = vec!["docs".to_string()];
    task
}

pub fn schema_document() -> Result<Vec<u8>> {
    let mut example = encode_task(&example_task());
    // hand-written tasks may omit the id
    example.id = None;
    let task_fields = schemars::schema_for!(TaskRecord);
    let statuses: Vec<String> = TaskStatus::ALL.iter().map(|s| s.to_string()).collect();
    let priorities: Vec<String> = TaskPriority::ALL.iter().map(|p| p.to_string()).collect();

    let document = json!({
        "description": "Files in this folder mirror one project of the tracker. Edits are picked up automatically.",
        "files": {
            "tasks.json": "Array of every task of this project. Always rewritten whole; tasks missing from the array are removed.",
            "project.json": "Project metadata. Only the keys present are applied; 'id' is required and cannot change. Derived keys (activeSprint, totalTasks, doneTasks, progress) are ignored.",
        },
        "taskFields": task_fields,
        "statusValues": statuses,
        "priorityValues": priorities,
        "projectPatchFields": PATCH_FIELDS,
        "colorFormat": "six hex digits, e.g. 4A90D9",
        "exampleTask": example,
    });
    to_sorted_json(&document)
}
