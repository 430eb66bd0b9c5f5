//! Project progress, schedule lateness and task-level progress helpers.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use super::{budget, percent, round2};
use crate::models::{Project, ProjectStatus, Task, TaskStatus};

/// Blend task completion and milestone completion into a percentage.
///
/// Both present: mean of the two ratios. One present: that ratio. Neither: 0.
pub fn blended_progress(
    done_tasks: usize,
    total_tasks: usize,
    reached_milestones: usize,
    total_milestones: usize,
) -> f64 {
    let task_ratio = (total_tasks > 0).then(|| done_tasks as f64 / total_tasks as f64);
    let milestone_ratio =
        (total_milestones > 0).then(|| reached_milestones as f64 / total_milestones as f64);

    match (task_ratio, milestone_ratio) {
        (Some(t), Some(m)) => (t + m) / 2.0 * 100.0,
        (Some(r), None) | (None, Some(r)) => r * 100.0,
        (None, None) => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub days_remaining: i64,
    pub is_late: bool,
    pub late_days: i64,
}

pub fn schedule(planned_end: NaiveDate, status: ProjectStatus, today: NaiveDate) -> Schedule {
    let days_remaining = (planned_end - today).num_days().max(0);
    let is_late = today > planned_end && status != ProjectStatus::Done;
    let late_days = if is_late {
        (today - planned_end).num_days()
    } else {
        0
    };
    Schedule {
        days_remaining,
        is_late,
        late_days,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgress {
    pub project_id: String,
    pub code: String,
    pub name: String,
    pub status: ProjectStatus,
    pub progress: f64,
    pub total_tasks: usize,
    pub done_tasks: usize,
    pub total_milestones: usize,
    pub reached_milestones: usize,
    pub planned_end: NaiveDate,
    #[serde(flatten)]
    pub schedule: Schedule,
}

/// Progress of `project`; `tasks` may include tasks of other projects.
pub fn project_progress(project: &Project, tasks: &[Task], today: NaiveDate) -> ProjectProgress {
    let own: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.project_id == project.id)
        .collect();
    let done_tasks = own
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .count();
    let reached_milestones = project.milestones.iter().filter(|m| m.reached).count();

    ProjectProgress {
        project_id: project.id.clone(),
        code: project.code.clone(),
        name: project.name.clone(),
        status: project.status,
        progress: round2(blended_progress(
            done_tasks,
            own.len(),
            reached_milestones,
            project.milestones.len(),
        )),
        total_tasks: own.len(),
        done_tasks,
        total_milestones: project.milestones.len(),
        reached_milestones,
        planned_end: project.planned_end,
        schedule: schedule(project.planned_end, project.status, today),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub progress: ProjectProgress,
    pub budget: budget::BudgetStatus,
    pub open_tasks: usize,
    pub late_tasks: usize,
}

pub fn project_stats(project: &Project, tasks: &[Task], today: NaiveDate) -> ProjectStats {
    let own = || tasks.iter().filter(|t| t.project_id == project.id);
    ProjectStats {
        progress: project_progress(project, tasks, today),
        budget: budget::budget_status(project),
        open_tasks: own().filter(|t| t.status.is_open()).count(),
        late_tasks: own().filter(|t| t.is_late(today)).count(),
    }
}

/// Stored progress for a status: done forces 100, todo forces 0, otherwise clamped.
pub fn normalized_progress(status: TaskStatus, requested: i64) -> i64 {
    match status {
        TaskStatus::Done => 100,
        TaskStatus::Todo => 0,
        _ => requested.clamp(0, 100),
    }
}

/// Own progress averaged with the mean subtask progress, when there are subtasks.
pub fn combined_progress(own: i64, subtasks: &[Task]) -> f64 {
    if subtasks.is_empty() {
        return own as f64;
    }
    let mean = subtasks.iter().map(|t| t.progress as f64).sum::<f64>() / subtasks.len() as f64;
    (own as f64 + mean) / 2.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub task_id: String,
    pub subtask_total: usize,
    pub subtask_done: usize,
    pub dependency_total: usize,
    pub dependency_done: usize,
    pub combined_progress: f64,
    /// Actual minus estimated hours
    pub effort_variance: f64,
    pub completion_pct: f64,
}

pub fn task_stats(task: &Task, subtasks: &[Task], dependencies: &[Task]) -> TaskStats {
    let subtask_done = subtasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .count();
    TaskStats {
        task_id: task.id.clone(),
        subtask_total: subtasks.len(),
        subtask_done,
        dependency_total: task.dependency_ids.len(),
        dependency_done: dependencies
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .count(),
        combined_progress: round2(combined_progress(task.progress, subtasks)),
        effort_variance: round2(task.actual_hours - task.estimated_hours),
        completion_pct: round2(percent(subtask_done as f64, subtasks.len() as f64)),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingTask {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanStart {
    pub can_start: bool,
    pub blocking: Vec<BlockingTask>,
}

/// A task can start once every dependency is done.
pub fn can_start(dependencies: &[Task]) -> CanStart {
    let blocking: Vec<BlockingTask> = dependencies
        .iter()
        .filter(|t| t.status != TaskStatus::Done)
        .map(|t| BlockingTask {
            id: t.id.clone(),
            title: t.title.clone(),
            status: t.status,
        })
        .collect();
    CanStart {
        can_start: blocking.is_empty(),
        blocking,
    }
}

/// Whether giving `task_id` the dependencies `new_deps` closes a cycle in `graph`.
///
/// `graph` maps each task of the project to its current dependency ids.
pub fn creates_cycle(
    task_id: &str,
    new_deps: &[String],
    graph: &HashMap<String, Vec<String>>,
) -> bool {
    let mut stack: Vec<&str> = new_deps.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    while let Some(current) = stack.pop() {
        if current == task_id {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = graph.get(current) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testing::{date, project, task};
    use crate::models::Milestone;

    fn milestone(reached: bool) -> Milestone {
        Milestone {
            id: uuid::Uuid::new_v4().to_string(),
            name: "m".to_string(),
            description: None,
            planned_date: date(2024, 5, 1),
            actual_date: None,
            reached,
        }
    }

    #[test]
    fn test_blended_progress_with_tasks_and_milestones() {
        let mut p = project("p1", 0.0, date(2024, 6, 30));
        p.milestones = vec![milestone(true), milestone(false)];
        let tasks = vec![
            task("t1", 1.0, TaskStatus::Done, "m1"),
            task("t2", 1.0, TaskStatus::Done, "m1"),
            task("t3", 1.0, TaskStatus::Done, "m1"),
            task("t4", 1.0, TaskStatus::InProgress, "m1"),
        ];

        let progress = project_progress(&p, &tasks, date(2024, 6, 1));
        assert_eq!(progress.progress, 62.5);
        assert_eq!(progress.done_tasks, 3);
        assert_eq!(progress.reached_milestones, 1);
    }

    #[test]
    fn test_blended_progress_single_source() {
        assert_eq!(blended_progress(1, 4, 0, 0), 25.0);
        assert_eq!(blended_progress(0, 0, 1, 2), 50.0);
        assert_eq!(blended_progress(0, 0, 0, 0), 0.0);
    }

    #[test]
    fn test_empty_project_has_zero_progress() {
        let p = project("p1", 0.0, date(2024, 6, 30));
        let other = vec![task("t1", 1.0, TaskStatus::Done, "m1")];
        let mut foreign = other.clone();
        foreign[0].project_id = "p2".to_string();

        assert_eq!(project_progress(&p, &foreign, date(2024, 6, 1)).progress, 0.0);
    }

    #[test]
    fn test_schedule_late_and_remaining() {
        let end = date(2024, 6, 30);

        let ahead = schedule(end, ProjectStatus::InProgress, date(2024, 6, 20));
        assert_eq!(ahead.days_remaining, 10);
        assert!(!ahead.is_late);
        assert_eq!(ahead.late_days, 0);

        let on_day = schedule(end, ProjectStatus::InProgress, end);
        assert!(!on_day.is_late);
        assert_eq!(on_day.days_remaining, 0);

        let late = schedule(end, ProjectStatus::InProgress, date(2024, 7, 5));
        assert!(late.is_late);
        assert_eq!(late.late_days, 5);
        assert_eq!(late.days_remaining, 0);

        let finished = schedule(end, ProjectStatus::Done, date(2024, 7, 5));
        assert!(!finished.is_late);
    }

    #[test]
    fn test_normalized_progress() {
        assert_eq!(normalized_progress(TaskStatus::Done, 10), 100);
        assert_eq!(normalized_progress(TaskStatus::Todo, 80), 0);
        assert_eq!(normalized_progress(TaskStatus::InProgress, 140), 100);
        assert_eq!(normalized_progress(TaskStatus::InReview, 40), 40);
    }

    #[test]
    fn test_task_stats_with_subtasks() {
        let mut parent = task("t1", 10.0, TaskStatus::InProgress, "m1");
        parent.progress = 40;
        parent.actual_hours = 12.5;
        parent.dependency_ids = vec!["d1".to_string(), "d2".to_string()];

        let mut s1 = task("s1", 1.0, TaskStatus::Done, "m1");
        s1.progress = 100;
        let mut s2 = task("s2", 1.0, TaskStatus::InProgress, "m1");
        s2.progress = 60;
        let d1 = task("d1", 1.0, TaskStatus::Done, "m1");
        let d2 = task("d2", 1.0, TaskStatus::Todo, "m1");

        let stats = task_stats(&parent, &[s1, s2], &[d1, d2.clone()]);
        assert_eq!(stats.combined_progress, 60.0);
        assert_eq!(stats.effort_variance, 2.5);
        assert_eq!(stats.subtask_done, 1);
        assert_eq!(stats.dependency_done, 1);

        let gate = can_start(&[d2]);
        assert!(!gate.can_start);
        assert_eq!(gate.blocking[0].id, "d2");
        assert!(can_start(&[]).can_start);
    }

    #[test]
    fn test_creates_cycle() {
        let graph: HashMap<String, Vec<String>> = [
            ("a".to_string(), vec![]),
            ("b".to_string(), vec!["a".to_string()]),
            ("c".to_string(), vec!["b".to_string()]),
        ]
        .into_iter()
        .collect();

        // a -> c closes a -> c -> b -> a
        assert!(creates_cycle("a", &["c".to_string()], &graph));
        assert!(creates_cycle("a", &["a".to_string()], &graph));
        assert!(!creates_cycle("c", &["a".to_string()], &graph));
    }

    #[test]
    fn test_project_stats_counts_late_tasks() {
        let p = project("p1", 1000.0, date(2024, 6, 30));
        let mut late = task("t1", 1.0, TaskStatus::InProgress, "m1");
        late.planned_end = Some(date(2024, 5, 1));
        let mut done = task("t2", 1.0, TaskStatus::Done, "m1");
        done.planned_end = Some(date(2024, 5, 1));

        let stats = project_stats(&p, &[late, done], date(2024, 6, 1));
        assert_eq!(stats.late_tasks, 1);
        assert_eq!(stats.open_tasks, 1);
        assert_eq!(stats.progress.progress, 50.0);
        assert_eq!(stats.budget.used_pct, 0.0);
    }
}
