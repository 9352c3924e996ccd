use chrono::{DateTime, Utc};

use super::{Activity, BurndownPoint, Project, Sprint, Task, TeamMember, VelocityPoint};

/// The whole domain state at one instant.
///
/// Snapshots have no identity of their own; replicas are compared by
/// `timestamp` only.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub sprints: Vec<Sprint>,
    pub velocity_data: Vec<VelocityPoint>,
    pub activities: Vec<Activity>,
    pub team_members: Vec<TeamMember>,
    pub burndown_ideal: Vec<BurndownPoint>,
    pub burndown_actual: Vec<BurndownPoint>,
}

impl Snapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            projects: Vec::new(),
            tasks: Vec::new(),
            sprints: Vec::new(),
            velocity_data: Vec::new(),
            activities: Vec::new(),
            team_members: Vec::new(),
            burndown_ideal: Vec::new(),
            burndown_actual: Vec::new(),
        }
    }

    /// Whether `self` should win over `other` in a last-writer-wins merge.
    pub fn is_newer_than(&self, other: &Snapshot) -> bool {
        self.timestamp > other.timestamp
    }
}
