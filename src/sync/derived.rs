//! Project fields computed from the task and sprint sets.

use uuid::Uuid;

use crate::entity::{DerivedFields, Project, Sprint, Task};

/// Label shown when a project has sprints but none is running.
pub const COMPLETED_SPRINT_LABEL: &str = "완료";

/// Active-sprint label for one project.
///
/// Empty without sprints, [`COMPLETED_SPRINT_LABEL`] when none is active,
/// the sprint name for exactly one, `"<first> 외 <n>개"` for more.
pub fn active_sprint_label(project_id: Uuid, sprints: &[Sprint]) -> String {
    let mut any = false;
    let mut active = Vec::new();
    for sprint in sprints.iter().filter(|s| s.project_id == project_id) {
        any = true;
        if sprint.is_active {
            active.push(sprint.name.as_str());
        }
    }

    match active.as_slice() {
        [] if !any => String::new(),
        [] => COMPLETED_SPRINT_LABEL.to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} 외 {}개", first, rest.len()),
    }
}

pub fn compute_derived(project_id: Uuid, tasks: &[Task], sprints: &[Sprint]) -> DerivedFields {
    let (total, done) = tasks
        .iter()
        .filter(|t| t.belongs_to(project_id))
        .fold((0usize, 0usize), |(total, done), t| {
            (total + 1, done + usize::from(t.status.is_terminal()))
        });
    let progress = if total == 0 {
        0.0
    } else {
        done as f64 / total as f64 * 100.0
    };

    DerivedFields {
        active_sprint: active_sprint_label(project_id, sprints),
        total_tasks: total,
        done_tasks: done,
        progress,
    }
}

/// Recompute every project's derived fields in place.
pub fn recompute_all(projects: &mut [Project], tasks: &[Task], sprints: &[Sprint]) {
    for project in projects.iter_mut() {
        project.derived = compute_derived(project.id, tasks, sprints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TaskStatus;
    use chrono::NaiveDate;

    fn sprint(project_id: Uuid, name: &str, active: bool) -> Sprint {
        let mut s = Sprint::new(project_id, name, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 14);
        s.is_active = active;
        s
    }

    #[test]
    fn test_progress_scenario() {
        let mut projects = vec![Project::new("P")];
        let pid = projects[0].id;
        let mut tasks = vec![
            Task::new("A", Some(pid)).with_status(TaskStatus::Done),
            Task::new("B", Some(pid)),
        ];

        recompute_all(&mut projects, &tasks, &[]);
        let d = projects[0].derived();
        assert_eq!((d.total_tasks, d.done_tasks), (2, 1));
        assert_eq!(d.progress, 50.0);

        tasks.push(Task::new("C", Some(pid)).with_status(TaskStatus::Done));
        recompute_all(&mut projects, &tasks, &[]);
        let d = projects[0].derived();
        assert_eq!((d.total_tasks, d.done_tasks), (3, 2));
        assert!((d.progress - 66.6667).abs() < 0.001);
    }

    #[test]
    fn test_empty_project_has_zero_progress() {
        let d = compute_derived(Uuid::new_v4(), &[], &[]);
        assert_eq!(d, DerivedFields::default());
    }

    #[test]
    fn test_other_projects_tasks_do_not_count() {
        let pid = Uuid::new_v4();
        let tasks = vec![
            Task::new("mine", Some(pid)),
            Task::new("theirs", Some(Uuid::new_v4())).with_status(TaskStatus::Done),
            Task::new("loose", None),
        ];
        let d = compute_derived(pid, &tasks, &[]);
        assert_eq!((d.total_tasks, d.done_tasks), (1, 0));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut projects = vec![Project::new("P")];
        let pid = projects[0].id;
        let tasks = vec![
            Task::new("A", Some(pid)).with_status(TaskStatus::Done),
            Task::new("B", Some(pid)),
            Task::new("C", Some(pid)),
        ];
        let sprints = vec![sprint(pid, "S1", true), sprint(pid, "S2", true)];

        recompute_all(&mut projects, &tasks, &sprints);
        let first = projects.clone();
        recompute_all(&mut projects, &tasks, &sprints);
        assert_eq!(projects, first);
        assert_eq!(
            projects[0].derived().progress.to_bits(),
            first[0].derived().progress.to_bits()
        );
    }

    #[test]
    fn test_label_variants() {
        let pid = Uuid::new_v4();
        assert_eq!(active_sprint_label(pid, &[]), "");

        let finished = vec![sprint(pid, "S1", false)];
        assert_eq!(active_sprint_label(pid, &finished), COMPLETED_SPRINT_LABEL);

        let one = vec![sprint(pid, "S1", false), sprint(pid, "S2", true)];
        assert_eq!(active_sprint_label(pid, &one), "S2");

        let many = vec![
            sprint(pid, "S3", true),
            sprint(pid, "S4", true),
            sprint(pid, "S5", true),
            sprint(Uuid::new_v4(), "elsewhere", true),
        ];
        assert_eq!(active_sprint_label(pid, &many), "S3 외 2개");
    }
}
