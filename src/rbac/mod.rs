//! Role-based access control.
//!
//! A static role -> permission table. Secondary roles add permissions on top of the primary role.

use std::collections::HashSet;

use crate::models::{text_enum, Role, SecondaryRole};

text_enum!(Permission {
    ProjectsCreate => "projects:create",
    ProjectsRead => "projects:read",
    ProjectsUpdate => "projects:update",
    ProjectsDelete => "projects:delete",
    TasksCreate => "tasks:create",
    TasksRead => "tasks:read",
    TasksUpdate => "tasks:update",
    TasksDelete => "tasks:delete",
    TasksAssign => "tasks:assign",
    TasksReview => "tasks:review",
    MembersCreate => "members:create",
    MembersRead => "members:read",
    MembersUpdate => "members:update",
    MembersDelete => "members:delete",
    TimesheetsCreate => "timesheets:create",
    TimesheetsRead => "timesheets:read",
    TimesheetsUpdate => "timesheets:update",
    TimesheetsDelete => "timesheets:delete",
    TimesheetsValidate => "timesheets:validate",
    CommentsCreate => "comments:create",
    CommentsRead => "comments:read",
    CommentsUpdate => "comments:update",
    CommentsDelete => "comments:delete",
    NotificationsRead => "notifications:read",
    NotificationsUpdate => "notifications:update",
    ReportsRead => "reports:read",
    ReportsFinancial => "reports:financial",
    AdminRead => "admin:read",
    AdminWrite => "admin:write",
});

use Permission::*;

const DIRECTOR: &[Permission] = &[
    ProjectsCreate,
    ProjectsRead,
    ProjectsUpdate,
    ProjectsDelete,
    TasksRead,
    MembersRead,
    TimesheetsRead,
    ReportsRead,
    ReportsFinancial,
    AdminRead,
];

const LEAD: &[Permission] = &[
    ProjectsRead,
    ProjectsUpdate,
    TasksCreate,
    TasksRead,
    TasksUpdate,
    TasksDelete,
    TasksAssign,
    TasksReview,
    MembersRead,
    TimesheetsRead,
    TimesheetsValidate,
    ReportsRead,
    CommentsCreate,
    CommentsRead,
    NotificationsRead,
    NotificationsUpdate,
];

const MEMBER: &[Permission] = &[
    ProjectsRead,
    TasksRead,
    TasksUpdate,
    TimesheetsCreate,
    TimesheetsRead,
    TimesheetsUpdate,
    TimesheetsDelete,
    CommentsCreate,
    CommentsRead,
    NotificationsRead,
    NotificationsUpdate,
];

const OBSERVER: &[Permission] = &[ProjectsRead, TasksRead, ReportsRead];

const TECHNICAL_LEAD: &[Permission] = &[TasksAssign, TasksReview];
const HR_MANAGER: &[Permission] = &[MembersRead, MembersUpdate];
const ACCOUNTANT: &[Permission] = &[TimesheetsRead, TimesheetsValidate, ReportsFinancial];

/// Permissions granted by a primary role.
pub fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => Permission::ALL,
        Role::Director => DIRECTOR,
        Role::Lead => LEAD,
        Role::Member => MEMBER,
        Role::Observer => OBSERVER,
    }
}

/// Permissions added by a secondary role.
pub fn secondary_permissions(role: SecondaryRole) -> &'static [Permission] {
    match role {
        SecondaryRole::TechnicalLead => TECHNICAL_LEAD,
        SecondaryRole::HrManager => HR_MANAGER,
        SecondaryRole::Accountant => ACCOUNTANT,
    }
}

/// Effective permission set for a role combination.
pub fn effective_permissions(role: Role, secondary: &[SecondaryRole]) -> HashSet<Permission> {
    role_permissions(role)
        .iter()
        .chain(secondary.iter().flat_map(|r| secondary_permissions(*r)))
        .copied()
        .collect()
}
