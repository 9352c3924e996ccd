//! One-time upgrade of sprint names embedded in older data into Sprint
//! entities.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::entity::{Project, Sprint, Task};

/// Create an active sprint for every `(project, name)` pair referenced by a
/// legacy project sprint name or a task's sprint name that has no Sprint
/// yet. Returns how many were created; zero once every pair exists.
pub fn migrate_legacy_sprints(
    projects: &[Project],
    tasks: &[Task],
    sprints: &mut Vec<Sprint>,
    today: NaiveDate,
    length_days: i64,
) -> usize {
    let known_projects: HashSet<Uuid> = projects.iter().map(|p| p.id).collect();

    let legacy_pairs = projects
        .iter()
        .filter_map(|p| p.legacy_sprint.as_deref().map(|name| (p.id, name)))
        .chain(
            tasks
                .iter()
                .filter_map(|t| t.project_id.map(|pid| (pid, t.sprint.as_str()))),
        )
        .map(|(pid, name)| (pid, name.trim()))
        .filter(|(pid, name)| !name.is_empty() && known_projects.contains(pid));

    let mut existing: HashSet<(Uuid, String)> = sprints
        .iter()
        .map(|s| (s.project_id, s.name.clone()))
        .collect();

    let mut created = 0;
    for (project_id, name) in legacy_pairs {
        if existing.insert((project_id, name.to_string())) {
            sprints.push(Sprint::new(project_id, name, today, length_days));
            created += 1;
        }
    }

    if created > 0 {
        info!(created, "migrated legacy sprint names");
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn test_shared_legacy_name_creates_one_sprint() {
        let mut project = Project::new("P");
        project.legacy_sprint = Some("S1".to_string());
        let mut task = Task::new("t", Some(project.id));
        task.sprint = "S1".to_string();
        let projects = vec![project];
        let tasks = vec![task];
        let mut sprints = Vec::new();

        let created = migrate_legacy_sprints(&projects, &tasks, &mut sprints, today(), 14);
        assert_eq!(created, 1);
        assert_eq!(sprints.len(), 1);
        assert_eq!(sprints[0].name, "S1");
        assert_eq!(sprints[0].project_id, projects[0].id);
        assert!(sprints[0].is_active);
        assert_eq!(sprints[0].start_date, today());
        assert_eq!(sprints[0].end_date, NaiveDate::from_ymd_opt(2024, 6, 16).unwrap());
    }

    #[test]
    fn test_second_run_creates_nothing() {
        let mut project = Project::new("P");
        project.legacy_sprint = Some("S1".to_string());
        let mut task = Task::new("t", Some(project.id));
        task.sprint = "S2".to_string();
        let projects = vec![project];
        let tasks = vec![task];
        let mut sprints = Vec::new();

        assert_eq!(migrate_legacy_sprints(&projects, &tasks, &mut sprints, today(), 14), 2);
        let count = sprints.len();
        assert_eq!(migrate_legacy_sprints(&projects, &tasks, &mut sprints, today(), 14), 0);
        assert_eq!(sprints.len(), count);
    }

    #[test]
    fn test_existing_sprint_is_respected() {
        let mut project = Project::new("P");
        project.legacy_sprint = Some("S1".to_string());
        let mut sprints = vec![Sprint::new(project.id, "S1", today(), 7)];
        sprints[0].is_active = false;

        let created = migrate_legacy_sprints(&[project], &[], &mut sprints, today(), 14);
        assert_eq!(created, 0);
        assert!(!sprints[0].is_active);
    }

    #[test]
    fn test_same_name_in_two_projects_is_two_sprints() {
        let mut a = Project::new("A");
        a.legacy_sprint = Some("S1".to_string());
        let mut b = Project::new("B");
        b.legacy_sprint = Some("S1".to_string());
        let mut sprints = Vec::new();

        assert_eq!(migrate_legacy_sprints(&[a, b], &[], &mut sprints, today(), 14), 2);
    }

    #[test]
    fn test_unlinked_and_blank_names_are_skipped() {
        let project = Project::new("P");
        let mut loose = Task::new("loose", None);
        loose.sprint = "S1".to_string();
        let mut blank = Task::new("blank", Some(project.id));
        blank.sprint = "   ".to_string();
        let mut orphan = Task::new("orphan", Some(Uuid::new_v4()));
        orphan.sprint = "S9".to_string();
        let mut sprints = Vec::new();

        let created =
            migrate_legacy_sprints(&[project], &[loose, blank, orphan], &mut sprints, today(), 14);
        assert_eq!(created, 0);
    }
}
