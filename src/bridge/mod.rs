//! Per-project side files that external tools can read and edit.
//!
//! Each linked project gets a hidden folder inside its source tree holding
//! `tasks.json` (the project's tasks, always whole), `project.json` (its
//! metadata, read back as a sparse patch) and `_schema.json`. The folder is
//! watched; after a settle delay, files that changed since our own last
//! write are decoded into [`BridgeEvent`]s.

mod schema;
mod watch;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{
    decode_project_patch, decode_task_list, encode_project_file, encode_task_list, PathCodec,
};
use crate::config::SyncConfig;
use crate::entity::{Project, ProjectPatch, Task};
use crate::error::{Result, SyncError};
use crate::storage::{write_atomic, Debouncer};

pub use schema::schema_document;
use watch::WatchHandle;

pub const BRIDGE_DIR: &str = ".tracksync";
pub const TASKS_FILE: &str = "tasks.json";
pub const PROJECT_FILE: &str = "project.json";
pub const SCHEMA_FILE: &str = "_schema.json";

/// A change made to a project's bridge files by someone else.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// `tasks.json` changed: these are now all of the project's tasks.
    ReplaceTasks { project_id: Uuid, tasks: Vec<Task> },
    /// `project.json` changed.
    PatchProject(ProjectPatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BridgeFile {
    Tasks,
    Project,
}

impl BridgeFile {
    fn name(&self) -> &'static str {
        match self {
            BridgeFile::Tasks => TASKS_FILE,
            BridgeFile::Project => PROJECT_FILE,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FileMark {
    /// mtime left by our own last write
    self_write: Option<SystemTime>,
    /// mtime of the last external change already reported
    seen: Option<SystemTime>,
}

/// State shared between the bridge and its watch tasks.
pub(crate) struct BridgeCore {
    paths: PathCodec,
    self_write_threshold: Duration,
    pub(crate) settle_delay: Duration,
    marks: Mutex<HashMap<(Uuid, BridgeFile), FileMark>>,
}

impl BridgeCore {
    fn bridge_dir(project: &Project) -> Option<PathBuf> {
        let source = project.linked_path()?;
        if !source.is_dir() {
            return None;
        }
        Some(source.join(BRIDGE_DIR))
    }

    fn write_project(&self, project: &Project, tasks: &[Task]) {
        let Some(dir) = Self::bridge_dir(project) else {
            debug!(project_id = %project.id, "project has no bridge, skipping write");
            return;
        };
        if let Err(e) = self.try_write_project(&dir, project, tasks) {
            warn!(project_id = %project.id, dir = %dir.display(), error = %e, "bridge write failed");
        }
    }

    fn try_write_project(&self, dir: &Path, project: &Project, tasks: &[Task]) -> Result<()> {
        fs::create_dir_all(dir)?;

        let project_path = dir.join(PROJECT_FILE);
        write_atomic(&project_path, &encode_project_file(project, &self.paths)?)?;
        self.record_self_write(project.id, BridgeFile::Project, &project_path);

        let tasks_path = dir.join(TASKS_FILE);
        let own = tasks.iter().filter(|t| t.belongs_to(project.id));
        write_atomic(&tasks_path, &encode_task_list(own)?)?;
        self.record_self_write(project.id, BridgeFile::Tasks, &tasks_path);

        let schema_path = dir.join(SCHEMA_FILE);
        if !schema_path.exists() {
            write_atomic(&schema_path, &schema_document()?)?;
        }
        Ok(())
    }

    /// Create the folder and an empty `tasks.json` if missing.
    fn prepare_dir(&self, project_id: Uuid, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let tasks_path = dir.join(TASKS_FILE);
        if !tasks_path.exists() {
            write_atomic(&tasks_path, &encode_task_list(std::iter::empty())?)?;
            self.record_self_write(project_id, BridgeFile::Tasks, &tasks_path);
        }
        Ok(())
    }

    fn record_self_write(&self, project_id: Uuid, file: BridgeFile, path: &Path) {
        let mtime = fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());
        if let Ok(mut marks) = self.marks.lock() {
            marks.entry((project_id, file)).or_default().self_write = Some(mtime);
        }
    }

    /// The file's mtime if it changed since our last write by at least the
    /// self-write threshold and has not been reported yet.
    fn detect_external(&self, project_id: Uuid, file: BridgeFile, path: &Path) -> Option<SystemTime> {
        let mtime = fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let mut marks = self.marks.lock().ok()?;
        let mark = marks.entry((project_id, file)).or_default();

        if let Some(own) = mark.self_write {
            if mtime < own + self.self_write_threshold {
                return None;
            }
        }
        if let Some(seen) = mark.seen {
            if mtime <= seen {
                return None;
            }
        }
        mark.seen = Some(mtime);
        Some(mtime)
    }

    pub(crate) fn check_for_changes(&self, project_id: Uuid, dir: &Path) -> Vec<BridgeEvent> {
        let mut found = Vec::new();

        let tasks_path = dir.join(BridgeFile::Tasks.name());
        if self.detect_external(project_id, BridgeFile::Tasks, &tasks_path).is_some() {
            if let Some(tasks) = self.read_tasks(project_id, &tasks_path) {
                info!(%project_id, file = BridgeFile::Tasks.name(), count = tasks.len(), "external edit");
                found.push(BridgeEvent::ReplaceTasks { project_id, tasks });
            }
        }

        let project_path = dir.join(BridgeFile::Project.name());
        if let Some(mtime) = self.detect_external(project_id, BridgeFile::Project, &project_path) {
            if let Some(patch) = self.read_patch(project_id, &project_path, mtime) {
                info!(%project_id, file = BridgeFile::Project.name(), "external edit");
                found.push(BridgeEvent::PatchProject(patch));
            }
        }

        found
    }

    fn read_tasks(&self, project_id: Uuid, path: &Path) -> Option<Vec<Task>> {
        let decoded = fs::read(path)
            .map_err(SyncError::from)
            .and_then(|bytes| decode_task_list(&bytes));
        match decoded {
            Ok(mut tasks) => {
                for task in &mut tasks {
                    task.project_id = Some(project_id);
                }
                Some(tasks)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable bridge file");
                None
            }
        }
    }

    fn read_patch(&self, project_id: Uuid, path: &Path, mtime: SystemTime) -> Option<ProjectPatch> {
        let file_clock: DateTime<Utc> = mtime.into();
        let decoded = fs::read(path)
            .map_err(SyncError::from)
            .and_then(|bytes| decode_project_patch(&bytes, file_clock, &self.paths));
        match decoded {
            Ok(patch) if patch.id == project_id => Some(patch),
            Ok(patch) => {
                warn!(%project_id, found = %patch.id, "project.json id does not match, ignoring");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable bridge file");
                None
            }
        }
    }
}

/// Keeps each linked project's side files in step with the domain model.
///
/// File system failures never propagate: the affected project just stops
/// being mirrored or observed.
pub struct FileBridge {
    core: Arc<BridgeCore>,
    events: mpsc::UnboundedSender<BridgeEvent>,
    writer: Debouncer<(Vec<Project>, Vec<Task>)>,
    watchers: HashMap<Uuid, WatchHandle>,
}

impl FileBridge {
    /// Detected changes are posted to `events`. Must be called from within
    /// a tokio runtime.
    pub fn new(config: &SyncConfig, events: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        let core = Arc::new(BridgeCore {
            paths: PathCodec::new(config.home_dir.clone()),
            self_write_threshold: config.self_write_threshold(),
            settle_delay: config.settle_delay(),
            marks: Mutex::new(HashMap::new()),
        });
        let sink_core = Arc::clone(&core);
        let writer = Debouncer::spawn(
            config.save_debounce(),
            move |(projects, tasks): (Vec<Project>, Vec<Task>)| {
                for project in &projects {
                    sink_core.write_project(project, &tasks);
                }
            },
        );

        Self {
            core,
            events,
            writer,
            watchers: HashMap::new(),
        }
    }

    /// The bridge folder of a project, if it has a source path that exists.
    pub fn bridge_dir(project: &Project) -> Option<PathBuf> {
        BridgeCore::bridge_dir(project)
    }

    /// Write the project's metadata and task files now.
    pub fn save(&self, project: &Project, tasks: &[Task]) {
        self.core.write_project(project, tasks);
    }

    pub fn save_all(&self, projects: &[Project], tasks: &[Task]) {
        for project in projects.iter().filter(|p| p.linked_path().is_some()) {
            self.save(project, tasks);
        }
    }

    /// Debounced [`save_all`](Self::save_all) that runs off the caller's task.
    pub fn queue_save_all(&self, projects: Vec<Project>, tasks: Vec<Task>) {
        let projects: Vec<Project> = projects
            .into_iter()
            .filter(|p| p.linked_path().is_some())
            .collect();
        if projects.is_empty() {
            return;
        }
        self.writer.submit((projects, tasks));
    }

    pub fn start_watching(&mut self, project: &Project) {
        let Some(dir) = Self::bridge_dir(project) else {
            self.stop_watching(project.id);
            return;
        };
        if self.watchers.get(&project.id).is_some_and(|w| w.dir == dir) {
            return;
        }
        self.stop_watching(project.id);

        if let Err(e) = self.core.prepare_dir(project.id, &dir) {
            warn!(project_id = %project.id, dir = %dir.display(), error = %e, "cannot prepare bridge folder");
            return;
        }
        match WatchHandle::start(Arc::clone(&self.core), project.id, dir.clone(), self.events.clone()) {
            Ok(handle) => {
                debug!(project_id = %project.id, dir = %dir.display(), "watching bridge folder");
                self.watchers.insert(project.id, handle);
            }
            Err(e) => {
                warn!(project_id = %project.id, dir = %dir.display(), error = %e, "cannot watch bridge folder");
            }
        }
    }

    /// Watch every linked project and drop watches of projects not listed.
    pub fn start_watching_all(&mut self, projects: &[Project]) {
        self.watchers
            .retain(|id, _| projects.iter().any(|p| p.id == *id));
        for project in projects {
            self.start_watching(project);
        }
    }

    pub fn stop_watching(&mut self, project_id: Uuid) {
        if self.watchers.remove(&project_id).is_some() {
            debug!(%project_id, "stopped watching bridge folder");
        }
    }

    pub fn stop_all(&mut self) {
        self.watchers.clear();
    }

    pub fn is_watching(&self, project_id: Uuid) -> bool {
        self.watchers.contains_key(&project_id)
    }

    /// Re-read a project's bridge files and return what changed externally.
    pub fn check_for_changes(&self, project: &Project) -> Vec<BridgeEvent> {
        match Self::bridge_dir(project) {
            Some(dir) => self.core.check_for_changes(project.id, &dir),
            None => Vec::new(),
        }
    }
}
