//! Budget roll-up arithmetic and time statistics over approved entries.
//!
//! The stored counters are moved by `RollupDelta` inside the approval transaction;
//! the functions here derive read views from the stored values.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;

use serde::Serialize;

use super::{percent, round2};
use crate::models::{Member, Project, Task, TimesheetEntry};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub project_id: String,
    pub allocated: f64,
    pub consumed: f64,
    pub remaining: f64,
    pub used_pct: f64,
    pub is_overrun: bool,
}

pub fn budget_status(project: &Project) -> BudgetStatus {
    let allocated = project.allocated_budget;
    let consumed = project.consumed_budget;
    BudgetStatus {
        project_id: project.id.clone(),
        allocated: round2(allocated),
        consumed: round2(consumed),
        remaining: round2(allocated - consumed),
        used_pct: round2(percent(consumed, allocated)),
        is_overrun: consumed > allocated,
    }
}

/// Change applied to a project's consumed budget and a task's actual hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollupDelta {
    pub cost: f64,
    pub hours: f64,
}

impl RollupDelta {
    /// Delta for an entry entering the approved state.
    pub fn approve(hours: f64, hourly_rate: f64) -> Self {
        Self {
            cost: hours * hourly_rate.max(0.0),
            hours,
        }
    }

    /// Delta for an entry leaving the approved state: takes back exactly what was charged.
    pub fn revert(charged_cost: f64, hours: f64) -> Self {
        Self {
            cost: -charged_cost,
            hours: -hours,
        }
    }
}

/// Counter value after applying `delta`, floored at zero like the stored update.
pub fn floored(current: f64, delta: f64) -> f64 {
    (current + delta).max(0.0)
}

/// Hours (and cost) booked against one member, project or task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursBucket {
    pub id: String,
    pub label: String,
    pub hours: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTimeStats {
    pub project_id: String,
    pub total_hours: f64,
    pub total_cost: f64,
    pub by_member: Vec<HoursBucket>,
    pub by_task: Vec<HoursBucket>,
    /// Estimated hours of the tasks that received time
    pub estimated_hours: f64,
    /// Booked minus estimated hours
    pub variance_hours: f64,
    pub entry_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberTimeStats {
    pub member_id: String,
    pub total_hours: f64,
    pub total_cost: f64,
    pub by_project: Vec<HoursBucket>,
    pub by_task: Vec<HoursBucket>,
    pub entry_count: usize,
}

#[derive(Default)]
struct Buckets {
    order: Vec<String>,
    totals: HashMap<String, (f64, f64)>,
}

impl Buckets {
    fn add(&mut self, id: &str, hours: f64, cost: f64) {
        let slot = self.totals.entry(id.to_string()).or_insert_with(|| {
            self.order.push(id.to_string());
            (0.0, 0.0)
        });
        slot.0 += hours;
        slot.1 += cost;
    }

    /// Buckets sorted by hours descending, labelled through `label`.
    fn finish(self, label: impl Fn(&str) -> String) -> Vec<HoursBucket> {
        let mut out: Vec<HoursBucket> = self
            .order
            .iter()
            .map(|id| {
                let (hours, cost) = self.totals[id];
                HoursBucket {
                    id: id.clone(),
                    label: label(id),
                    hours: round2(hours),
                    cost: round2(cost),
                }
            })
            .collect();
        out.sort_by(|a, b| b.hours.total_cmp(&a.hours));
        out
    }
}

/// Time statistics for a project from its approved entries.
///
/// `members` supplies names and rates; `tasks` supplies titles and estimates.
pub fn project_time_stats(
    project_id: &str,
    entries: &[TimesheetEntry],
    members: &HashMap<String, Member>,
    tasks: &HashMap<String, Task>,
) -> ProjectTimeStats {
    let mut by_member = Buckets::default();
    let mut by_task = Buckets::default();
    let mut touched: HashSet<&str> = HashSet::new();
    let mut total_hours = 0.0;
    let mut total_cost = 0.0;
    let mut count = 0;

    for e in entries
        .iter()
        .filter(|e| e.project_id == project_id && e.is_approved())
    {
        let rate = members.get(&e.member_id).map_or(0.0, |m| m.hourly_rate);
        let cost = e.charged_cost(rate);
        total_hours += e.hours;
        total_cost += cost;
        count += 1;
        by_member.add(&e.member_id, e.hours, cost);
        if let Some(task_id) = &e.task_id {
            by_task.add(task_id, e.hours, cost);
            touched.insert(task_id);
        }
    }

    let estimated_hours: f64 = touched
        .iter()
        .filter_map(|id| tasks.get(*id))
        .map(|t| t.estimated_hours)
        .sum();

    ProjectTimeStats {
        project_id: project_id.to_string(),
        total_hours: round2(total_hours),
        total_cost: round2(total_cost),
        by_member: by_member.finish(|id| {
            members
                .get(id)
                .map_or_else(|| id.to_string(), Member::full_name)
        }),
        by_task: by_task.finish(|id| {
            tasks
                .get(id)
                .map_or_else(|| id.to_string(), |t| t.title.clone())
        }),
        estimated_hours: round2(estimated_hours),
        variance_hours: round2(total_hours - estimated_hours),
        entry_count: count,
    }
}

/// Time statistics for a member from their approved entries.
pub fn member_time_stats(
    member: &Member,
    entries: &[TimesheetEntry],
    projects: &HashMap<String, Project>,
    tasks: &HashMap<String, Task>,
) -> MemberTimeStats {
    let mut by_project = Buckets::default();
    let mut by_task = Buckets::default();
    let mut total_hours = 0.0;
    let mut total_cost = 0.0;
    let mut count = 0;

    for e in entries
        .iter()
        .filter(|e| e.member_id == member.id && e.is_approved())
    {
        let cost = e.charged_cost(member.hourly_rate);
        total_hours += e.hours;
        total_cost += cost;
        count += 1;
        by_project.add(&e.project_id, e.hours, cost);
        if let Some(task_id) = &e.task_id {
            by_task.add(task_id, e.hours, cost);
        }
    }

    MemberTimeStats {
        member_id: member.id.clone(),
        total_hours: round2(total_hours),
        total_cost: round2(total_cost),
        by_project: by_project.finish(|id| {
            projects
                .get(id)
                .map_or_else(|| id.to_string(), |p| p.name.clone())
        }),
        by_task: by_task.finish(|id| {
            tasks
                .get(id)
                .map_or_else(|| id.to_string(), |t| t.title.clone())
        }),
        entry_count: count,
    }
}

/// Approved hours split by day, project and member.
pub struct TimeBreakdown {
    pub total_hours: f64,
    /// Ascending by date
    pub by_day: Vec<(NaiveDate, f64)>,
    pub by_project: Vec<HoursBucket>,
    pub by_member: Vec<HoursBucket>,
}

pub fn time_breakdown(
    entries: &[TimesheetEntry],
    members: &HashMap<String, Member>,
    projects: &HashMap<String, Project>,
) -> TimeBreakdown {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut by_project = Buckets::default();
    let mut by_member = Buckets::default();
    let mut total_hours = 0.0;

    for e in entries.iter().filter(|e| e.is_approved()) {
        let rate = members.get(&e.member_id).map_or(0.0, |m| m.hourly_rate);
        let cost = e.charged_cost(rate);
        total_hours += e.hours;
        *by_day.entry(e.date).or_insert(0.0) += e.hours;
        by_project.add(&e.project_id, e.hours, cost);
        by_member.add(&e.member_id, e.hours, cost);
    }

    TimeBreakdown {
        total_hours: round2(total_hours),
        by_day: by_day.into_iter().map(|(d, h)| (d, round2(h))).collect(),
        by_project: by_project.finish(|id| {
            projects
                .get(id)
                .map_or_else(|| id.to_string(), |p| p.name.clone())
        }),
        by_member: by_member.finish(|id| {
            members
                .get(id)
                .map_or_else(|| id.to_string(), Member::full_name)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testing::{date, entry, member, project, task};
    use crate::models::{TaskStatus, TimesheetStatus};

    #[test]
    fn test_budget_status_after_two_approvals() {
        let mut p = project("p1", 1000.0, date(2024, 6, 30));
        for hours in [5.0, 3.0] {
            let delta = RollupDelta::approve(hours, 50.0);
            p.consumed_budget = floored(p.consumed_budget, delta.cost);
        }

        let status = budget_status(&p);
        assert_eq!(status.consumed, 400.0);
        assert_eq!(status.used_pct, 40.0);
        assert_eq!(status.remaining, 600.0);
        assert!(!status.is_overrun);
    }

    #[test]
    fn test_revert_of_approved_entry() {
        let delta = RollupDelta::revert(250.0, 5.0);
        assert_eq!(floored(400.0, delta.cost), 150.0);
        assert_eq!(floored(8.0, delta.hours), 3.0);
    }

    #[test]
    fn test_revert_floors_at_zero() {
        let delta = RollupDelta::revert(250.0, 5.0);
        assert_eq!(floored(100.0, delta.cost), 0.0);
    }

    #[test]
    fn test_round_trip_returns_to_zero() {
        let entries = [(5.0, 50.0), (3.0, 80.0), (0.25, 120.0)];
        let mut consumed = 0.0;
        let mut charged = Vec::new();
        for (h, r) in entries {
            let delta = RollupDelta::approve(h, r);
            consumed = floored(consumed, delta.cost);
            charged.push(delta);
        }
        assert_eq!(consumed, 5.0 * 50.0 + 3.0 * 80.0 + 0.25 * 120.0);
        for delta in charged {
            consumed = floored(consumed, RollupDelta::revert(delta.cost, delta.hours).cost);
        }
        assert_eq!(consumed, 0.0);
    }

    #[test]
    fn test_zero_allocation_and_overrun() {
        let mut p = project("p1", 0.0, date(2024, 6, 30));
        p.consumed_budget = 10.0;
        let status = budget_status(&p);
        assert_eq!(status.used_pct, 0.0);
        assert!(status.is_overrun);
    }

    #[test]
    fn test_project_time_stats() {
        let members: HashMap<String, Member> = [member("m1", 35.0, 50.0), member("m2", 35.0, 100.0)]
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        let tasks: HashMap<String, Task> = [task("t1", 10.0, TaskStatus::InProgress, "m1")]
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        let mut e1 = entry("m1", date(2024, 3, 4), 4.0, TimesheetStatus::Approved);
        e1.task_id = Some("t1".to_string());
        let mut e2 = entry("m1", date(2024, 3, 5), 3.0, TimesheetStatus::Approved);
        e2.task_id = Some("t1".to_string());
        let e3 = entry("m2", date(2024, 3, 5), 2.0, TimesheetStatus::Approved);
        let e4 = entry("m2", date(2024, 3, 6), 8.0, TimesheetStatus::Submitted);

        let stats = project_time_stats("p1", &[e1, e2, e3, e4], &members, &tasks);

        assert_eq!(stats.total_hours, 9.0);
        assert_eq!(stats.total_cost, 7.0 * 50.0 + 2.0 * 100.0);
        assert_eq!(stats.entry_count, 3);
        assert_eq!(stats.by_member[0].id, "m1");
        assert_eq!(stats.by_member[0].hours, 7.0);
        assert_eq!(stats.by_task.len(), 1);
        // t1 is counted once even though two entries touched it
        assert_eq!(stats.estimated_hours, 10.0);
        assert_eq!(stats.variance_hours, -1.0);
    }

    #[test]
    fn test_member_time_stats() {
        let m = member("m1", 35.0, 40.0);
        let mut other = project("p2", 0.0, date(2024, 6, 30));
        other.name = "Billing".to_string();
        let projects: HashMap<String, Project> = [other]
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let e1 = entry("m1", date(2024, 3, 4), 2.0, TimesheetStatus::Approved);
        let mut e2 = entry("m1", date(2024, 3, 5), 6.0, TimesheetStatus::Approved);
        e2.project_id = "p2".to_string();
        let e3 = entry("m1", date(2024, 3, 6), 1.0, TimesheetStatus::Rejected);

        let stats = member_time_stats(&m, &[e1, e2, e3], &projects, &HashMap::new());

        assert_eq!(stats.total_hours, 8.0);
        assert_eq!(stats.total_cost, 320.0);
        assert_eq!(stats.by_project[0].label, "Billing");
        assert_eq!(stats.by_project[1].label, "p1");
    }

    #[test]
    fn test_member_time_stats_uses_recorded_charge() {
        let m = member("m1", 35.0, 10.0);
        let mut e = entry("m1", date(2024, 3, 4), 5.0, TimesheetStatus::Approved);
        e.approved_cost = Some(250.0);

        let stats = member_time_stats(&m, &[e], &HashMap::new(), &HashMap::new());

        assert_eq!(stats.total_cost, 250.0);
    }

    #[test]
    fn test_time_breakdown() {
        let members: HashMap<String, Member> = [member("m1", 35.0, 50.0), member("m2", 35.0, 10.0)]
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let e1 = entry("m1", date(2024, 3, 5), 4.0, TimesheetStatus::Approved);
        let e2 = entry("m2", date(2024, 3, 4), 2.5, TimesheetStatus::Approved);
        let mut e3 = entry("m2", date(2024, 3, 5), 1.5, TimesheetStatus::Approved);
        e3.project_id = "p2".to_string();
        let e4 = entry("m1", date(2024, 3, 6), 8.0, TimesheetStatus::Draft);

        let report = time_breakdown(&[e1, e2, e3, e4], &members, &HashMap::new());

        assert_eq!(report.total_hours, 8.0);
        assert_eq!(
            report.by_day,
            vec![(date(2024, 3, 4), 2.5), (date(2024, 3, 5), 5.5)]
        );
        assert_eq!(report.by_project[0].id, "p1");
        assert_eq!(report.by_project[0].hours, 6.5);
        assert_eq!(report.by_project[0].cost, 225.0);
        assert_eq!(report.by_member[0].id, "m1");
        assert_eq!(report.by_member[1].hours, 4.0);
    }
}
