use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::derived::recompute_all;
use crate::entity::{
    Activity, BurndownPoint, PatchOutcome, Project, ProjectPatch, Snapshot, Sprint, Task,
    TaskStatus, TeamMember, VelocityPoint,
};
use crate::error::{Result, SyncError};

/// Oldest activity entries beyond this are discarded.
pub const MAX_ACTIVITIES: usize = 500;

fn not_found(kind: &str, id: Uuid) -> SyncError {
    SyncError::EntityNotFound(format!("{} {}", kind, id))
}

/// In-memory collections of the domain model.
///
/// Pure data operations only; persistence and suppression are the
/// orchestrator's concern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainStore {
    projects: Vec<Project>,
    tasks: Vec<Task>,
    sprints: Vec<Sprint>,
    velocity_data: Vec<VelocityPoint>,
    activities: Vec<Activity>,
    team_members: Vec<TeamMember>,
    burndown_ideal: Vec<BurndownPoint>,
    burndown_actual: Vec<BurndownPoint>,
}

impl DomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            projects: snapshot.projects,
            tasks: snapshot.tasks,
            sprints: snapshot.sprints,
            velocity_data: snapshot.velocity_data,
            activities: snapshot.activities,
            team_members: snapshot.team_members,
            burndown_ideal: snapshot.burndown_ideal,
            burndown_actual: snapshot.burndown_actual,
        }
    }

    pub fn to_snapshot(&self, timestamp: DateTime<Utc>) -> Snapshot {
        Snapshot {
            timestamp,
            projects: self.projects.clone(),
            tasks: self.tasks.clone(),
            sprints: self.sprints.clone(),
            velocity_data: self.velocity_data.clone(),
            activities: self.activities.clone(),
            team_members: self.team_members.clone(),
            burndown_ideal: self.burndown_ideal.clone(),
            burndown_actual: self.burndown_actual.clone(),
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn sprints(&self) -> &[Sprint] {
        &self.sprints
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn team_members(&self) -> &[TeamMember] {
        &self.team_members
    }

    pub fn velocity_data(&self) -> &[VelocityPoint] {
        &self.velocity_data
    }

    pub fn burndown(&self) -> (&[BurndownPoint], &[BurndownPoint]) {
        (&self.burndown_ideal, &self.burndown_actual)
    }

    pub fn project(&self, id: Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn sprint(&self, id: Uuid) -> Option<&Sprint> {
        self.sprints.iter().find(|s| s.id == id)
    }

    pub fn tasks_for(&self, project_id: Uuid) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.belongs_to(project_id))
    }

    pub fn sprints_for(&self, project_id: Uuid) -> impl Iterator<Item = &Sprint> {
        self.sprints.iter().filter(move |s| s.project_id == project_id)
    }

    fn project_mut(&mut self, id: Uuid) -> Result<&mut Project> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("project", id))
    }

    fn task_mut(&mut self, id: Uuid) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found("task", id))
    }

    fn sprint_mut(&mut self, id: Uuid) -> Result<&mut Sprint> {
        self.sprints
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found("sprint", id))
    }

    pub fn recompute_derived(&mut self) {
        recompute_all(&mut self.projects, &self.tasks, &self.sprints);
    }

    pub(crate) fn sprints_mut(&mut self) -> &mut Vec<Sprint> {
        &mut self.sprints
    }

    // Projects

    pub fn add_project(&mut self, project: Project) {
        self.projects.push(project);
    }

    /// Replace a project's editable fields. Derived fields are kept until
    /// the next recompute.
    pub fn update_project(&mut self, project: Project) -> Result<()> {
        let slot = self.project_mut(project.id)?;
        let derived = std::mem::take(&mut slot.derived);
        *slot = project;
        slot.derived = derived;
        Ok(())
    }

    /// Remove a project together with its sprints; its tasks stay but are
    /// detached.
    pub fn delete_project(&mut self, id: Uuid) -> Result<Project> {
        let index = self
            .projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| not_found("project", id))?;
        let project = self.projects.remove(index);

        self.sprints.retain(|s| s.project_id != id);
        for task in self.tasks.iter_mut().filter(|t| t.belongs_to(id)) {
            task.project_id = None;
            task.sprint.clear();
        }
        Ok(project)
    }

    /// `None` when no such project exists.
    pub fn apply_patch(&mut self, patch: &ProjectPatch) -> Option<PatchOutcome> {
        self.projects
            .iter_mut()
            .find(|p| p.id == patch.id)
            .map(|p| p.apply_patch(patch))
    }

    // Tasks

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn update_task(&mut self, task: Task) -> Result<()> {
        let slot = self.task_mut(task.id)?;
        *slot = task;
        Ok(())
    }

    pub fn delete_task(&mut self, id: Uuid) -> Result<Task> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| not_found("task", id))?;
        Ok(self.tasks.remove(index))
    }

    pub fn set_task_status(&mut self, id: Uuid, status: TaskStatus, now: DateTime<Utc>) -> Result<()> {
        let task = self.task_mut(id)?;
        task.status = status;
        task.updated_at = now;
        Ok(())
    }

    /// Swap all tasks of one project for `tasks`. Tasks of other projects
    /// are untouched unless an incoming task carries their id, in which
    /// case it moves into this project. Task ids stay unique; of repeated
    /// incoming ids the first one wins.
    pub fn replace_project_tasks(&mut self, project_id: Uuid, tasks: Vec<Task>) {
        let mut incoming = HashSet::with_capacity(tasks.len());
        let tasks: Vec<Task> = tasks
            .into_iter()
            .filter(|t| incoming.insert(t.id))
            .map(|mut t| {
                t.project_id = Some(project_id);
                t
            })
            .collect();
        self.tasks
            .retain(|t| !t.belongs_to(project_id) && !incoming.contains(&t.id));
        self.tasks.extend(tasks);
    }

    // Sprints

    pub fn add_sprint(&mut self, sprint: Sprint) {
        self.sprints.push(sprint);
    }

    /// Replace a sprint. A rename is carried over to the tasks that
    /// referenced the old name.
    pub fn update_sprint(&mut self, sprint: Sprint) -> Result<()> {
        let slot = self.sprint_mut(sprint.id)?;
        let (old_project, old_name) = (slot.project_id, std::mem::take(&mut slot.name));
        *slot = sprint;
        let (project_id, name) = (slot.project_id, slot.name.clone());

        if old_name != name || old_project != project_id {
            for task in self
                .tasks
                .iter_mut()
                .filter(|t| t.belongs_to(old_project) && t.sprint == old_name)
            {
                task.sprint = name.clone();
                task.project_id = Some(project_id);
            }
        }
        Ok(())
    }

    pub fn delete_sprint(&mut self, id: Uuid) -> Result<Sprint> {
        let index = self
            .sprints
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| not_found("sprint", id))?;
        let sprint = self.sprints.remove(index);

        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.belongs_to(sprint.project_id) && t.sprint == sprint.name)
        {
            task.sprint.clear();
        }
        Ok(sprint)
    }

    pub fn set_sprint_active(&mut self, id: Uuid, active: bool) -> Result<()> {
        self.sprint_mut(id)?.is_active = active;
        Ok(())
    }

    /// Put a task into a sprint, or take it out of any with `None`. The
    /// task moves to the sprint's project.
    pub fn assign_task_to_sprint(
        &mut self,
        task_id: Uuid,
        sprint_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let target = match sprint_id {
            Some(id) => {
                let sprint = self.sprint(id).ok_or_else(|| not_found("sprint", id))?;
                Some((sprint.project_id, sprint.name.clone()))
            }
            None => None,
        };

        let task = self.task_mut(task_id)?;
        match target {
            Some((project_id, name)) => {
                task.project_id = Some(project_id);
                task.sprint = name;
            }
            None => task.sprint.clear(),
        }
        task.updated_at = now;
        Ok(())
    }

    // Team and activity log

    pub fn add_team_member(&mut self, member: TeamMember) {
        self.team_members.push(member);
    }

    pub fn remove_team_member(&mut self, id: Uuid) -> Result<TeamMember> {
        let index = self
            .team_members
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| not_found("team member", id))?;
        Ok(self.team_members.remove(index))
    }

    /// Newest entries come first.
    pub fn push_activity(&mut self, activity: Activity) {
        self.activities.insert(0, activity);
        self.activities.truncate(MAX_ACTIVITIES);
    }
}
