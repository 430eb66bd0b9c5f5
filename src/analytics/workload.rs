//! Member workload: estimated load against weekly availability.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use super::round2;
use crate::config::WorkloadThresholds;
use crate::models::{LeavePeriod, Member, Task, TimesheetEntry};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub member_id: String,
    pub member_name: String,
    pub reference_date: NaiveDate,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    /// Estimated hours of open assigned tasks
    pub estimated_load: f64,
    /// Approved hours booked in the reference week
    pub actual_load: f64,
    pub availability: f64,
    pub utilization_pct: f64,
    pub overloaded: bool,
    pub underloaded: bool,
    pub open_tasks: usize,
}

/// Monday and Sunday of the week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    (start, start + Duration::days(6))
}

/// Weekly availability, zeroed when a planned or ongoing leave covers `date`.
pub fn availability_on(weekly: f64, leaves: &[LeavePeriod], date: NaiveDate) -> f64 {
    if leaves.iter().any(|l| l.is_active() && l.covers(date)) {
        0.0
    } else {
        weekly.max(0.0)
    }
}

/// Load as a percentage of availability. Load with no availability counts as saturated.
pub fn utilization_pct(estimated_load: f64, availability: f64) -> f64 {
    if availability > 0.0 {
        estimated_load / availability * 100.0
    } else if estimated_load > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// Compute the workload of `member` for the week containing `reference`.
///
/// `tasks` and `entries` may hold records of other members; they are filtered here.
pub fn compute(
    member: &Member,
    tasks: &[Task],
    entries: &[TimesheetEntry],
    reference: NaiveDate,
    thresholds: WorkloadThresholds,
) -> Workload {
    let (week_start, week_end) = week_bounds(reference);

    let open: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status.is_open() && t.is_assigned_to(&member.id))
        .collect();
    let estimated_load: f64 = open.iter().map(|t| t.estimated_hours.max(0.0)).sum();

    let actual_load: f64 = entries
        .iter()
        .filter(|e| {
            e.member_id == member.id
                && e.is_approved()
                && e.date >= week_start
                && e.date <= week_end
        })
        .map(|e| e.hours)
        .sum();

    let availability = availability_on(member.weekly_availability, &member.leaves, reference);
    let utilization = utilization_pct(estimated_load, availability);

    let saturated = availability <= 0.0 && estimated_load > 0.0;
    let overloaded = utilization > thresholds.overload_pct || saturated;
    let underloaded = utilization < thresholds.underload_pct && estimated_load > 0.0;

    Workload {
        member_id: member.id.clone(),
        member_name: member.full_name(),
        reference_date: reference,
        week_start,
        week_end,
        estimated_load: round2(estimated_load),
        actual_load: round2(actual_load),
        availability: round2(availability),
        utilization_pct: round2(utilization),
        overloaded,
        underloaded,
        open_tasks: open.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testing::{date, entry, member, task};
    use crate::models::{LeaveKind, LeaveStatus, TaskStatus, TimesheetStatus};

    #[test]
    fn test_week_bounds_monday_to_sunday() {
        // 2024-03-06 is a Wednesday
        let (start, end) = week_bounds(date(2024, 3, 6));
        assert_eq!(start, date(2024, 3, 4));
        assert_eq!(end, date(2024, 3, 10));

        let (start, end) = week_bounds(date(2024, 3, 10));
        assert_eq!(start, date(2024, 3, 4));
        assert_eq!(end, date(2024, 3, 10));
    }

    #[test]
    fn test_overloaded_member() {
        let m = member("m1", 20.0, 50.0);
        let tasks = vec![
            task("t1", 15.0, TaskStatus::InProgress, "m1"),
            task("t2", 10.0, TaskStatus::Todo, "m1"),
            task("t3", 40.0, TaskStatus::Done, "m1"),
            task("t4", 40.0, TaskStatus::Todo, "m2"),
        ];

        let w = compute(&m, &tasks, &[], date(2024, 3, 6), WorkloadThresholds::default());

        assert_eq!(w.estimated_load, 25.0);
        assert_eq!(w.utilization_pct, 125.0);
        assert!(w.overloaded);
        assert!(!w.underloaded);
        assert_eq!(w.open_tasks, 2);
    }

    #[test]
    fn test_zero_availability_with_load_is_saturated() {
        let m = member("m1", 0.0, 50.0);
        let tasks = vec![task("t1", 3.0, TaskStatus::Todo, "m1")];

        let w = compute(&m, &tasks, &[], date(2024, 3, 6), WorkloadThresholds::default());

        assert_eq!(w.utilization_pct, 100.0);
        assert!(w.overloaded);
        assert!(!w.underloaded);
    }

    #[test]
    fn test_leave_zeroes_availability() {
        let mut m = member("m1", 35.0, 50.0);
        m.leaves.push(LeavePeriod {
            start: date(2024, 3, 4),
            end: date(2024, 3, 6),
            kind: LeaveKind::Sick,
            reason: None,
            status: LeaveStatus::Ongoing,
        });
        let tasks = vec![task("t1", 7.0, TaskStatus::Todo, "m1")];

        let on_leave = compute(&m, &tasks, &[], date(2024, 3, 6), WorkloadThresholds::default());
        assert_eq!(on_leave.availability, 0.0);
        assert_eq!(on_leave.utilization_pct, 100.0);

        let back = compute(&m, &tasks, &[], date(2024, 3, 7), WorkloadThresholds::default());
        assert_eq!(back.availability, 35.0);
        assert_eq!(back.utilization_pct, 20.0);
        assert!(back.underloaded);
    }

    #[test]
    fn test_cancelled_leave_is_ignored() {
        let leaves = vec![LeavePeriod {
            start: date(2024, 3, 1),
            end: date(2024, 3, 31),
            kind: LeaveKind::Annual,
            reason: None,
            status: LeaveStatus::Cancelled,
        }];
        assert_eq!(availability_on(35.0, &leaves, date(2024, 3, 6)), 35.0);
    }

    #[test]
    fn test_actual_load_counts_approved_entries_in_week() {
        let m = member("m1", 35.0, 50.0);
        let entries = vec![
            entry("m1", date(2024, 3, 4), 4.0, TimesheetStatus::Approved),
            entry("m1", date(2024, 3, 10), 2.5, TimesheetStatus::Approved),
            entry("m1", date(2024, 3, 5), 8.0, TimesheetStatus::Submitted),
            entry("m1", date(2024, 3, 11), 6.0, TimesheetStatus::Approved),
            entry("m2", date(2024, 3, 5), 3.0, TimesheetStatus::Approved),
        ];

        let w = compute(&m, &[], &entries, date(2024, 3, 6), WorkloadThresholds::default());

        assert_eq!(w.actual_load, 6.5);
        assert_eq!(w.estimated_load, 0.0);
        assert_eq!(w.utilization_pct, 0.0);
        assert!(!w.overloaded);
        assert!(!w.underloaded);
    }

    #[test]
    fn test_custom_thresholds() {
        let m = member("m1", 40.0, 50.0);
        let tasks = vec![task("t1", 38.0, TaskStatus::Todo, "m1")];
        let thresholds = WorkloadThresholds {
            overload_pct: 90.0,
            underload_pct: 30.0,
        };

        let w = compute(&m, &tasks, &[], date(2024, 3, 6), thresholds);
        assert_eq!(w.utilization_pct, 95.0);
        assert!(w.overloaded);
    }
}
