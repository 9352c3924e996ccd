use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Color;

/// Fields computed from the task and sprint sets. Only the sync layer
/// writes them; everything else reads them through [`Project::derived`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFields {
    pub active_sprint: String,
    pub total_tasks: usize,
    pub done_tasks: usize,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub summary: String,
    pub color: Color,
    pub icon: String,
    /// Absolute path of the project's source tree, if linked.
    pub source_path: Option<PathBuf>,
    pub language: String,
    pub version: String,
    /// Sprint name embedded by older data files, consumed by the migration.
    pub legacy_sprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub(crate) derived: DerivedFields,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            summary: String::new(),
            color: Color::default(),
            icon: String::new(),
            source_path: None,
            language: String::new(),
            version: String::new(),
            legacy_sprint: None,
            created_at: now,
            last_modified: now,
            derived: DerivedFields::default(),
        }
    }

    pub fn derived(&self) -> &DerivedFields {
        &self.derived
    }

    /// Source path, ignoring an empty one.
    pub fn linked_path(&self) -> Option<&PathBuf> {
        self.source_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Merge a sparse patch into this project.
    ///
    /// A patch older than the project's own clock is dropped whole; absent
    /// fields never clear present values.
    pub fn apply_patch(&mut self, patch: &ProjectPatch) -> PatchOutcome {
        if patch.id != self.id {
            return PatchOutcome::IdMismatch;
        }
        if patch.last_modified < self.last_modified {
            return PatchOutcome::Stale;
        }

        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(summary) = &patch.summary {
            self.summary = summary.clone();
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(icon) = &patch.icon {
            self.icon = icon.clone();
        }
        if let Some(path) = &patch.source_path {
            self.source_path = Some(path.clone());
        }
        if let Some(language) = &patch.language {
            self.language = language.clone();
        }
        if let Some(version) = &patch.version {
            self.version = version.clone();
        }
        self.last_modified = patch.last_modified;

        PatchOutcome::Applied
    }
}

/// Sparse update for a project, decoded from a bridge `project.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPatch {
    pub id: Uuid,
    pub last_modified: DateTime<Utc>,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub color: Option<Color>,
    pub icon: Option<String>,
    pub source_path: Option<PathBuf>,
    pub language: Option<String>,
    pub version: Option<String>,
}

impl ProjectPatch {
    pub fn new(id: Uuid, last_modified: DateTime<Utc>) -> Self {
        Self {
            id,
            last_modified,
            name: None,
            summary: None,
            color: None,
            icon: None,
            source_path: None,
            language: None,
            version: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.summary.is_none()
            && self.color.is_none()
            && self.icon.is_none()
            && self.source_path.is_none()
            && self.language.is_none()
            && self.version.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// The patch clock is older than the project's; nothing changed.
    Stale,
    IdMismatch,
}
