//! Member model: identity, roles, rate, availability and leave periods.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::text_enum;

text_enum!(
    /// Primary role, drives permissions and the dashboard variant.
    Role {
        Admin => "admin",
        Director => "director",
        Lead => "lead",
        Member => "member",
        Observer => "observer",
    }
);

text_enum!(
    /// Additive roles layered on top of the primary role.
    SecondaryRole {
        TechnicalLead => "technical_lead",
        HrManager => "hr_manager",
        Accountant => "accountant",
    }
);

text_enum!(MemberStatus {
    Active => "active",
    Inactive => "inactive",
    OnLeave => "on_leave",
    Suspended => "suspended",
});

text_enum!(LeaveKind {
    Annual => "annual",
    Sick => "sick",
    Maternity => "maternity",
    Paternity => "paternity",
    Unpaid => "unpaid",
    Other => "other",
});

text_enum!(LeaveStatus {
    Planned => "planned",
    Ongoing => "ongoing",
    Finished => "finished",
    Cancelled => "cancelled",
});

/// A leave period; bounds are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeavePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub kind: LeaveKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: LeaveStatus,
}

impl LeavePeriod {
    /// Planned and ongoing leaves block availability and overlap checks.
    pub fn is_active(&self) -> bool {
        matches!(self.status, LeaveStatus::Planned | LeaveStatus::Ongoing)
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &LeavePeriod) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A member of the organisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    pub secondary_roles: Vec<SecondaryRole>,
    pub status: MemberStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
    pub skills: Vec<String>,
    pub hourly_rate: f64,
    /// Contracted hours per week
    pub weekly_availability: f64,
    pub leaves: Vec<LeavePeriod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    /// Local part of the email address, used for mention matching.
    pub fn email_handle(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// Request body for creating a member.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub secondary_roles: Vec<SecondaryRole>,
    #[serde(default = "default_status")]
    pub status: MemberStatus,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub hourly_rate: f64,
    #[serde(default = "default_availability")]
    pub weekly_availability: f64,
}

fn default_role() -> Role {
    Role::Member
}

fn default_status() -> MemberStatus {
    MemberStatus::Active
}

fn default_availability() -> f64 {
    35.0
}

/// Request body for updating a member.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub secondary_roles: Option<Vec<SecondaryRole>>,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub weekly_availability: Option<f64>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for adding or replacing a leave period.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub kind: LeaveKind,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_leave_status")]
    pub status: LeaveStatus,
}

fn default_leave_status() -> LeaveStatus {
    LeaveStatus::Planned
}

impl From<LeaveRequest> for LeavePeriod {
    fn from(req: LeaveRequest) -> Self {
        Self {
            start: req.start,
            end: req.end,
            kind: req.kind,
            reason: req.reason,
            status: req.status,
        }
    }
}

/// Query parameters for listing members.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberFilter {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    /// Case-insensitive match on name or email
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leave(start: (i32, u32, u32), end: (i32, u32, u32), status: LeaveStatus) -> LeavePeriod {
        LeavePeriod {
            start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            kind: LeaveKind::Annual,
            reason: None,
            status,
        }
    }

    #[test]
    fn test_leave_bounds_are_inclusive() {
        let l = leave((2024, 3, 4), (2024, 3, 8), LeaveStatus::Planned);
        assert!(l.covers(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()));
        assert!(l.covers(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()));
        assert!(!l.covers(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));
    }

    #[test]
    fn test_leave_overlap() {
        let a = leave((2024, 3, 4), (2024, 3, 8), LeaveStatus::Planned);
        let b = leave((2024, 3, 8), (2024, 3, 12), LeaveStatus::Ongoing);
        let c = leave((2024, 3, 9), (2024, 3, 12), LeaveStatus::Planned);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!leave((2024, 1, 1), (2024, 1, 2), LeaveStatus::Finished).is_active());
    }

    #[test]
    fn test_role_text_round_trip() {
        assert_eq!(Role::parse("director"), Some(Role::Director));
        assert_eq!(SecondaryRole::HrManager.as_str(), "hr_manager");
        assert_eq!(MemberStatus::parse("retired"), None);
        assert_eq!(
            serde_json::to_string(&MemberStatus::OnLeave).unwrap(),
            "\"on_leave\""
        );
    }
}
