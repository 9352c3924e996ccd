use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::gate::{SuppressionState, WriteGate};
use super::migration::migrate_legacy_sprints;
use super::store::DomainStore;
use crate::bridge::{BridgeEvent, FileBridge};
use crate::config::SyncConfig;
use crate::entity::{Activity, PatchOutcome, Project, Snapshot, Sprint, Task, TaskStatus, TeamMember};
use crate::error::Result;
use crate::storage::{CloudStore, PersistenceEngine};

/// Work produced off the coordination context, waiting to be applied.
#[derive(Debug)]
pub enum SyncEvent {
    /// The cloud copy became newer than the local cache.
    CloudChanged(Snapshot),
    /// A project's bridge files were edited externally.
    Bridge(BridgeEvent),
}

/// Where a state change has to be written. A change is never written back
/// to the side it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistTarget {
    Everywhere,
    CloudOnly,
    BridgeOnly,
}

impl PersistTarget {
    fn cloud(self) -> bool {
        matches!(self, PersistTarget::Everywhere | PersistTarget::CloudOnly)
    }

    fn bridge(self) -> bool {
        matches!(self, PersistTarget::Everywhere | PersistTarget::BridgeOnly)
    }
}

/// Owns the domain store and wires it to the persistence engine and the
/// file bridge.
///
/// All state lives here and is only touched through `&mut self`; watch and
/// monitoring tasks hand their results over as [`SyncEvent`]s which the
/// host feeds back with [`run`](Self::run) or
/// [`drain_events`](Self::drain_events).
pub struct SyncOrchestrator {
    config: SyncConfig,
    store: DomainStore,
    gate: WriteGate,
    persistence: PersistenceEngine,
    bridge: FileBridge,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    bridge_events: mpsc::UnboundedReceiver<BridgeEvent>,
    migrated: bool,
    /// Timestamp of the state last loaded, restored or queued for the cloud.
    local_clock: Option<DateTime<Utc>>,
    /// A user change was suppressed by the restore cooldown and still has
    /// to be written once it ends.
    deferred: bool,
}

impl SyncOrchestrator {
    /// Must be called from within a tokio runtime.
    pub fn new(config: SyncConfig, cloud: Arc<dyn CloudStore>) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (bridge_tx, bridge_events) = mpsc::unbounded_channel();
        let persistence = PersistenceEngine::new(&config, cloud);
        let bridge = FileBridge::new(&config, bridge_tx);

        Self {
            config,
            store: DomainStore::new(),
            gate: WriteGate::new(),
            persistence,
            bridge,
            events_tx,
            events,
            bridge_events,
            migrated: false,
            local_clock: None,
            deferred: false,
        }
    }

    pub fn store(&self) -> &DomainStore {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn bridge(&self) -> &FileBridge {
        &self.bridge
    }

    pub fn suppression(&self) -> SuppressionState {
        self.gate.state(Instant::now())
    }

    /// Snapshots physically written by the persistence engine so far.
    pub fn physical_writes(&self) -> u64 {
        self.persistence.physical_writes()
    }

    /// Load the newest replica, upgrade legacy sprint names, then start
    /// cloud monitoring and bridge watches.
    pub async fn load_and_start_sync(&mut self) {
        let loaded = self.persistence.load().await;
        let restored = loaded.is_some();

        self.gate.begin_restore();
        if let Some(snapshot) = loaded {
            info!(
                timestamp = %snapshot.timestamp,
                projects = snapshot.projects.len(),
                tasks = snapshot.tasks.len(),
                "snapshot loaded"
            );
            self.local_clock = Some(snapshot.timestamp);
            self.store = DomainStore::from_snapshot(snapshot);
        }
        let created = self.migrate_once();
        self.store.recompute_derived();
        let cooldown = restored.then(|| self.config.restore_cooldown());
        self.gate.end_restore(Instant::now(), cooldown);

        // migrated sprints are a local change; otherwise only refresh the
        // bridge files from what was loaded
        if created > 0 {
            self.persist(PersistTarget::Everywhere);
        } else {
            self.persist(PersistTarget::BridgeOnly);
        }

        let tx = self.events_tx.clone();
        self.persistence.start_monitoring(move |snapshot| {
            let _ = tx.send(SyncEvent::CloudChanged(snapshot));
        });
        self.bridge.start_watching_all(self.store.projects());
    }

    fn migrate_once(&mut self) -> usize {
        if self.migrated {
            return 0;
        }
        self.migrated = true;
        let today = Utc::now().date_naive();
        let (projects, tasks) = (self.store.projects().to_vec(), self.store.tasks().to_vec());
        migrate_legacy_sprints(
            &projects,
            &tasks,
            self.store.sprints_mut(),
            today,
            self.config.sprint_length_days,
        )
    }

    /// Request persistence of the current state to both backends. Returns
    /// `false` when suppressed by a restore or its cooldown; the change is
    /// then written once the cooldown is over.
    pub fn save(&mut self) -> bool {
        if !self.gate.allows_save(Instant::now()) {
            debug!(state = ?self.gate.state(Instant::now()), "save deferred");
            self.deferred = true;
            return false;
        }
        self.persist(PersistTarget::Everywhere);
        true
    }

    /// Write a deferred change if the cooldown holding it back has ended.
    fn flush_deferred(&mut self) -> bool {
        if !self.deferred || !self.gate.allows_save(Instant::now()) {
            return false;
        }
        info!("writing changes held back by the restore cooldown");
        self.persist(PersistTarget::Everywhere);
        true
    }

    /// When the deferred change, if any, may be written.
    fn deferred_due(&self) -> Option<Instant> {
        if !self.deferred {
            return None;
        }
        let now = Instant::now();
        match self.gate.state(now) {
            SuppressionState::Active => Some(now),
            SuppressionState::Cooldown(until) => Some(until),
            SuppressionState::Restoring => None,
        }
    }

    fn persist(&mut self, target: PersistTarget) {
        if target == PersistTarget::Everywhere {
            self.deferred = false;
        }
        if target.cloud() {
            let snapshot = self.store.to_snapshot(Utc::now());
            self.local_clock = Some(snapshot.timestamp);
            self.persistence.save(snapshot);
        }
        if target.bridge() {
            self.bridge
                .queue_save_all(self.store.projects().to_vec(), self.store.tasks().to_vec());
        }
    }

    /// Replace the whole state with `snapshot`. Anything still queued for
    /// writing is dropped, and saves stay suppressed for the restore
    /// cooldown afterwards.
    pub fn restore(&mut self, snapshot: Snapshot) {
        info!(timestamp = %snapshot.timestamp, "restoring snapshot");
        self.persistence.discard_pending();
        self.deferred = false;
        self.local_clock = Some(snapshot.timestamp);
        self.gate.begin_restore();
        self.store = DomainStore::from_snapshot(snapshot);
        self.store.recompute_derived();
        self.gate
            .end_restore(Instant::now(), Some(self.config.restore_cooldown()));
        self.bridge.start_watching_all(self.store.projects());
    }

    /// Apply an edit read from a project's bridge files. Returns whether
    /// state changed; a change is persisted to the cloud only.
    pub fn apply_bridge_event(&mut self, event: BridgeEvent) -> bool {
        self.gate.begin_restore();
        let changed = match event {
            BridgeEvent::ReplaceTasks { project_id, tasks } => {
                if self.store.project(project_id).is_some() {
                    info!(%project_id, count = tasks.len(), "replacing project tasks from bridge");
                    self.store.replace_project_tasks(project_id, tasks);
                    true
                } else {
                    debug!(%project_id, "tasks for unknown project ignored");
                    false
                }
            }
            BridgeEvent::PatchProject(patch) => match self.store.apply_patch(&patch) {
                Some(PatchOutcome::Applied) => {
                    info!(project_id = %patch.id, "project patched from bridge");
                    if let Some(project) = self.store.project(patch.id) {
                        self.bridge.start_watching(project);
                    }
                    true
                }
                Some(PatchOutcome::Stale) => {
                    debug!(project_id = %patch.id, patch_clock = %patch.last_modified, "stale project patch dropped");
                    false
                }
                Some(PatchOutcome::IdMismatch) | None => {
                    debug!(project_id = %patch.id, "patch for unknown project ignored");
                    false
                }
            },
        };
        if changed {
            self.store.recompute_derived();
        }
        self.gate.end_restore(Instant::now(), None);

        if changed {
            self.persist(PersistTarget::CloudOnly);
        }
        changed
    }

    fn apply_cloud_snapshot(&mut self, snapshot: Snapshot) {
        if let Some(clock) = self.local_clock {
            if snapshot.timestamp <= clock {
                info!(
                    cloud = %snapshot.timestamp,
                    local = %clock,
                    "local state is newer, ignoring cloud snapshot"
                );
                return;
            }
        }
        self.restore(snapshot);
        self.persist(PersistTarget::BridgeOnly);
    }

    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::CloudChanged(snapshot) => self.apply_cloud_snapshot(snapshot),
            SyncEvent::Bridge(event) => {
                self.apply_bridge_event(event);
            }
        }
    }

    fn try_next_event(&mut self) -> Option<SyncEvent> {
        self.events
            .try_recv()
            .ok()
            .or_else(|| self.bridge_events.try_recv().ok().map(SyncEvent::Bridge))
    }

    /// Apply every event already waiting, without blocking, and write a
    /// deferred change whose cooldown has ended. Returns how many events
    /// were handled.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.try_next_event() {
            self.handle_event(event);
            handled += 1;
        }
        self.flush_deferred();
        handled
    }

    /// Apply events as they arrive until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        loop {
            let due = self.deferred_due();
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    self.flush_deferred();
                    continue;
                }
                Some(event) = self.events.recv() => event,
                Some(event) = self.bridge_events.recv() => SyncEvent::Bridge(event),
                else => break,
            };
            self.handle_event(event);
        }
        debug!("sync loop stopped");
    }

    /// Stop all background watching and write out unsaved local changes,
    /// including one still held back by a restore cooldown.
    pub async fn shutdown(&mut self) {
        self.persistence.stop_monitoring();
        self.bridge.stop_all();
        if self.deferred {
            self.deferred = false;
            let snapshot = self.store.to_snapshot(Utc::now());
            self.local_clock = Some(snapshot.timestamp);
            self.persistence.save_immediately(snapshot).await;
        } else if self.persistence.flush_pending().await {
            debug!("pending snapshot written on shutdown");
        }
        info!("sync stopped");
    }

    fn commit(&mut self) {
        self.store.recompute_derived();
        self.save();
    }

    fn log_activity(&mut self, message: String, project_id: Option<Uuid>) {
        self.store.push_activity(Activity::new(message, project_id));
    }

    // Projects

    pub fn add_project(&mut self, project: Project) -> Uuid {
        let id = project.id;
        self.bridge.start_watching(&project);
        self.store.add_project(project);
        self.commit();
        id
    }

    pub fn update_project(&mut self, mut project: Project) -> Result<()> {
        let id = project.id;
        project.last_modified = Utc::now();
        self.store.update_project(project)?;
        if let Some(project) = self.store.project(id) {
            self.bridge.start_watching(project);
        }
        self.commit();
        Ok(())
    }

    /// Delete a project and its sprints. Its tasks are kept, detached.
    pub fn delete_project(&mut self, id: Uuid) -> Result<()> {
        let project = self.store.delete_project(id)?;
        self.bridge.stop_watching(id);
        self.log_activity(format!("Deleted project \"{}\"", project.name), None);
        self.commit();
        Ok(())
    }

    // Tasks

    pub fn add_task(&mut self, task: Task) -> Uuid {
        let (id, project_id) = (task.id, task.project_id);
        self.log_activity(format!("Added task \"{}\"", task.title), project_id);
        self.store.add_task(task);
        self.commit();
        id
    }

    pub fn update_task(&mut self, mut task: Task) -> Result<()> {
        task.updated_at = Utc::now();
        let (title, project_id) = (task.title.clone(), task.project_id);
        self.store.update_task(task)?;
        self.log_activity(format!("Updated task \"{}\"", title), project_id);
        self.commit();
        Ok(())
    }

    pub fn set_task_status(&mut self, id: Uuid, status: TaskStatus) -> Result<()> {
        self.store.set_task_status(id, status, Utc::now())?;
        if let Some(task) = self.store.task(id) {
            let message = format!("Moved task \"{}\" to {}", task.title, status);
            let project_id = task.project_id;
            self.log_activity(message, project_id);
        }
        self.commit();
        Ok(())
    }

    pub fn delete_task(&mut self, id: Uuid) -> Result<()> {
        let task = self.store.delete_task(id)?;
        self.log_activity(format!("Deleted task \"{}\"", task.title), task.project_id);
        self.commit();
        Ok(())
    }

    /// `None` takes the task out of its sprint.
    pub fn assign_task_to_sprint(&mut self, task_id: Uuid, sprint_id: Option<Uuid>) -> Result<()> {
        self.store.assign_task_to_sprint(task_id, sprint_id, Utc::now())?;
        if let Some(task) = self.store.task(task_id) {
            let message = if task.sprint.is_empty() {
                format!("Removed task \"{}\" from its sprint", task.title)
            } else {
                format!("Assigned task \"{}\" to {}", task.title, task.sprint)
            };
            let project_id = task.project_id;
            self.log_activity(message, project_id);
        }
        self.commit();
        Ok(())
    }

    // Sprints

    pub fn add_sprint(&mut self, sprint: Sprint) -> Uuid {
        let id = sprint.id;
        self.store.add_sprint(sprint);
        self.commit();
        id
    }

    pub fn update_sprint(&mut self, sprint: Sprint) -> Result<()> {
        self.store.update_sprint(sprint)?;
        self.commit();
        Ok(())
    }

    pub fn delete_sprint(&mut self, id: Uuid) -> Result<()> {
        self.store.delete_sprint(id)?;
        self.commit();
        Ok(())
    }

    pub fn set_sprint_active(&mut self, id: Uuid, active: bool) -> Result<()> {
        self.store.set_sprint_active(id, active)?;
        self.commit();
        Ok(())
    }

    // Team

    pub fn add_team_member(&mut self, member: TeamMember) -> Uuid {
        let id = member.id;
        self.store.add_team_member(member);
        self.commit();
        id
    }

    pub fn remove_team_member(&mut self, id: Uuid) -> Result<()> {
        self.store.remove_team_member(id)?;
        self.commit();
        Ok(())
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        self.bridge.stop_all();
    }
}
