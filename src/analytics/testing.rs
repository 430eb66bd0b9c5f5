//! Record builders shared by the analytics tests.

use chrono::{NaiveDate, Utc};

use crate::models::{
    Member, MemberStatus, Priority, Project, ProjectStatus, Role, Task, TaskStatus,
    TimesheetEntry, TimesheetStatus,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn member(id: &str, availability: f64, rate: f64) -> Member {
    Member {
        id: id.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: format!("{}@example.com", id),
        phone: None,
        role: Role::Member,
        secondary_roles: vec![],
        status: MemberStatus::Active,
        hire_date: None,
        skills: vec![],
        hourly_rate: rate,
        weekly_availability: availability,
        leaves: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
        version: 1,
    }
}

pub fn project(id: &str, allocated: f64, planned_end: NaiveDate) -> Project {
    Project {
        id: id.to_string(),
        code: "PROJ-0001".to_string(),
        name: id.to_string(),
        description: None,
        status: ProjectStatus::InProgress,
        priority: Priority::Normal,
        planned_start: date(2024, 1, 1),
        planned_end,
        actual_start: None,
        actual_end: None,
        allocated_budget: allocated,
        consumed_budget: 0.0,
        lead_id: "lead".to_string(),
        member_ids: vec![],
        milestones: vec![],
        tags: vec![],
        history: vec![],
        is_template: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        version: 1,
    }
}

pub fn task(id: &str, hours: f64, status: TaskStatus, assignee: &str) -> Task {
    Task {
        id: id.to_string(),
        title: id.to_string(),
        description: None,
        project_id: "p1".to_string(),
        parent_id: None,
        status,
        priority: Priority::Normal,
        assignee_ids: vec![assignee.to_string()],
        estimated_hours: hours,
        actual_hours: 0.0,
        planned_start: None,
        planned_end: None,
        actual_start: None,
        actual_end: None,
        progress: 0,
        dependency_ids: vec![],
        attachments: vec![],
        tags: vec![],
        history: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
        version: 1,
    }
}

pub fn entry(member_id: &str, day: NaiveDate, hours: f64, status: TimesheetStatus) -> TimesheetEntry {
    TimesheetEntry {
        id: format!("e-{}-{}-{}", member_id, day, hours),
        member_id: member_id.to_string(),
        project_id: "p1".to_string(),
        task_id: None,
        date: day,
        hours,
        description: None,
        status,
        approver_id: None,
        approved_at: None,
        approval_comment: None,
        approved_cost: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
