//! Project lifecycle, milestones and per-project analytics.

use std::collections::HashMap;

use chrono::{Duration, Utc};

use super::{
    added_ids, authorize, check_version, dedup_ids, deny, index_project, index_task, load_member,
    load_project, notify, record_audit, today, unindex,
};
use crate::analytics::budget::{budget_status, project_time_stats, BudgetStatus, ProjectTimeStats};
use crate::analytics::progress::{project_progress, project_stats, ProjectProgress, ProjectStats};
use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::{
    AuditAction, ChangeSet, CopyProjectRequest, CreateMilestoneRequest, CreateProjectRequest,
    DateRange, Milestone, NewAuditLog, NewNotification, NotificationKind, Page, PageQuery,
    Project, ProjectFilter, ProjectStatus, ResourceType, Task, TaskStatus, UpdateMilestoneRequest,
    UpdateProjectRequest,
};
use crate::rbac::Permission;
use crate::search::SearchKind;
use crate::AppState;

pub async fn list(
    state: &AppState,
    principal: &Principal,
    filter: ProjectFilter,
) -> Result<Page<Project>, AppError> {
    authorize(state, principal, Permission::ProjectsRead).await?;
    let (limit, offset) = PageQuery {
        page: filter.page,
        page_size: filter.page_size,
    }
    .resolve(state.config.page_size);

    let (projects, total) = state.repo.list_projects(&filter, limit, offset).await?;
    Ok(Page::new(projects, total, limit, offset))
}

pub async fn get(state: &AppState, principal: &Principal, id: &str) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsRead).await?;
    load_project(state, id).await
}

pub async fn create(
    state: &AppState,
    principal: &Principal,
    request: CreateProjectRequest,
) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsCreate).await?;

    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Project name is required".to_string()));
    }
    if request.planned_end < request.planned_start {
        return Err(AppError::Validation(
            "Planned end must not precede planned start".to_string(),
        ));
    }
    if request.allocated_budget < 0.0 {
        return Err(AppError::Validation(
            "Allocated budget must not be negative".to_string(),
        ));
    }

    let code = resolve_code(state, request.code).await?;

    let lead_id = request
        .lead_id
        .unwrap_or_else(|| principal.member_id.clone());
    load_member(state, &lead_id).await?;
    let member_ids = dedup_ids(request.member_ids);
    for member_id in &member_ids {
        load_member(state, member_id).await?;
    }

    let now = Utc::now();
    let project = Project {
        id: uuid::Uuid::new_v4().to_string(),
        code,
        name,
        description: request.description,
        status: request.status,
        priority: request.priority,
        planned_start: request.planned_start,
        planned_end: request.planned_end,
        actual_start: None,
        actual_end: None,
        allocated_budget: request.allocated_budget,
        consumed_budget: 0.0,
        lead_id,
        member_ids,
        milestones: Vec::new(),
        tags: request.tags,
        history: Vec::new(),
        is_template: false,
        created_at: now,
        updated_at: now,
        version: 1,
    };
    state.repo.insert_project(&project).await?;

    tracing::info!(project_id = %project.id, code = %project.code, "Project created");
    notify_new_members(state, principal, &project, &[]).await;
    index_project(state, &project).await;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Create, "projects")
            .document(&project.id)
            .actor(&principal.member_id),
    )
    .await;
    Ok(project)
}

pub async fn update(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: UpdateProjectRequest,
) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsUpdate).await?;
    let existing = load_project(state, id).await?;
    ensure_manages(state, principal, &existing).await?;
    check_version(request.expected_version, existing.version)?;

    let mut project = existing.clone();
    if let Some(name) = request.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Project name is required".to_string()));
        }
        project.name = name;
    }
    if request.description.is_some() {
        project.description = request.description;
    }
    if let Some(status) = request.status {
        if existing.status.is_closed() && status != existing.status {
            return Err(AppError::ImmutableState(format!(
                "Project {} is {} and cannot change status",
                existing.code,
                existing.status.as_str()
            )));
        }
        project.status = status;
    }
    if let Some(priority) = request.priority {
        project.priority = priority;
    }
    if let Some(start) = request.planned_start {
        project.planned_start = start;
    }
    if let Some(end) = request.planned_end {
        project.planned_end = end;
    }
    if request.actual_start.is_some() {
        project.actual_start = request.actual_start;
    }
    if request.actual_end.is_some() {
        project.actual_end = request.actual_end;
    }
    if let Some(budget) = request.allocated_budget {
        if budget < 0.0 {
            return Err(AppError::Validation(
                "Allocated budget must not be negative".to_string(),
            ));
        }
        project.allocated_budget = budget;
    }
    if let Some(lead_id) = request.lead_id {
        if lead_id != project.lead_id {
            load_member(state, &lead_id).await?;
            project.lead_id = lead_id;
        }
    }
    if let Some(member_ids) = request.member_ids {
        let member_ids = dedup_ids(member_ids);
        for member_id in added_ids(&existing.member_ids, &member_ids) {
            load_member(state, member_id).await?;
        }
        project.member_ids = member_ids;
    }
    if let Some(tags) = request.tags {
        project.tags = tags;
    }

    if project.planned_end < project.planned_start {
        return Err(AppError::Validation(
            "Planned end must not precede planned start".to_string(),
        ));
    }
    if let (Some(start), Some(end)) = (project.actual_start, project.actual_end) {
        if end < start {
            return Err(AppError::Validation(
                "Actual end must not precede actual start".to_string(),
            ));
        }
    }

    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("name", &existing.name, &project.name);
    changes.track("description", &existing.description, &project.description);
    changes.track("status", &existing.status, &project.status);
    changes.track("priority", &existing.priority, &project.priority);
    changes.track("plannedStart", &existing.planned_start, &project.planned_start);
    changes.track("plannedEnd", &existing.planned_end, &project.planned_end);
    changes.track("actualStart", &existing.actual_start, &project.actual_start);
    changes.track("actualEnd", &existing.actual_end, &project.actual_end);
    changes.track(
        "allocatedBudget",
        &existing.allocated_budget,
        &project.allocated_budget,
    );
    changes.track("leadId", &existing.lead_id, &project.lead_id);
    changes.track("memberIds", &existing.member_ids, &project.member_ids);
    changes.track("tags", &existing.tags, &project.tags);

    save(state, principal, &existing, project, changes).await
}

/// Delete a project that no task or timesheet entry refers to.
pub async fn delete(state: &AppState, principal: &Principal, id: &str) -> Result<(), AppError> {
    authorize(state, principal, Permission::ProjectsDelete).await?;
    let project = load_project(state, id).await?;

    let (tasks, entries) = state.repo.project_dependents(id).await?;
    if tasks > 0 || entries > 0 {
        return Err(AppError::Validation(format!(
            "Project {} still has {} task(s) and {} timesheet entry(ies)",
            project.code, tasks, entries
        )));
    }

    state.repo.delete_project(id).await?;
    tracing::info!(project_id = id, "Project deleted");
    unindex(state, SearchKind::Project, id).await;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Delete, "projects")
            .document(id)
            .actor(&principal.member_id)
            .snapshot(&project),
    )
    .await;
    Ok(())
}

pub async fn archive(state: &AppState, principal: &Principal, id: &str) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsUpdate).await?;
    let existing = load_project(state, id).await?;
    ensure_manages(state, principal, &existing).await?;
    if existing.status == ProjectStatus::Archived {
        return Err(AppError::ImmutableState(format!(
            "Project {} is already archived",
            existing.code
        )));
    }

    let mut project = existing.clone();
    project.status = ProjectStatus::Archived;
    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("status", &existing.status, &project.status);

    save(state, principal, &existing, project, changes).await
}

/// Copy a project into a new one in planning.
pub async fn duplicate(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: CopyProjectRequest,
) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsCreate).await?;
    let source = load_project(state, id).await?;
    if source.is_template {
        return Err(AppError::Validation(format!(
            "Project {} is a template; instantiate it instead",
            source.code
        )));
    }
    let default_name = format!("Copy of {}", source.name);
    copy_project(state, principal, &source, request, default_name, false).await
}

/// Save a copy of a project as a reusable template.
pub async fn save_as_template(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: CopyProjectRequest,
) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsCreate).await?;
    let source = load_project(state, id).await?;
    if source.is_template {
        return Err(AppError::Validation(format!(
            "Project {} is already a template",
            source.code
        )));
    }
    let default_name = source.name.clone();
    copy_project(state, principal, &source, request, default_name, true).await
}

pub async fn list_templates(state: &AppState, principal: &Principal) -> Result<Vec<Project>, AppError> {
    authorize(state, principal, Permission::ProjectsRead).await?;
    state.repo.list_templates().await
}

/// Start a new project from a template.
pub async fn instantiate_template(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: CopyProjectRequest,
) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsCreate).await?;
    let template = load_project(state, id).await?;
    if !template.is_template {
        return Err(AppError::Validation(format!(
            "Project {} is not a template",
            template.code
        )));
    }
    let default_name = template.name.clone();
    copy_project(state, principal, &template, request, default_name, false).await
}

pub async fn add_milestone(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: CreateMilestoneRequest,
) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsUpdate).await?;
    let existing = load_project(state, id).await?;
    ensure_manages(state, principal, &existing).await?;

    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Milestone name is required".to_string()));
    }

    let mut project = existing.clone();
    project.milestones.push(Milestone {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        description: request.description,
        planned_date: request.planned_date,
        actual_date: None,
        reached: false,
    });
    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("milestones", &existing.milestones, &project.milestones);

    save(state, principal, &existing, project, changes).await
}

/// Update a milestone; reaching it stamps today's date unless one is given.
pub async fn update_milestone(
    state: &AppState,
    principal: &Principal,
    id: &str,
    milestone_id: &str,
    request: UpdateMilestoneRequest,
) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsUpdate).await?;
    let existing = load_project(state, id).await?;
    ensure_manages(state, principal, &existing).await?;

    let mut project = existing.clone();
    let milestone = project
        .milestones
        .iter_mut()
        .find(|m| m.id == milestone_id)
        .ok_or_else(|| AppError::not_found("Milestone", milestone_id))?;

    if let Some(name) = request.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Milestone name is required".to_string()));
        }
        milestone.name = name;
    }
    if request.description.is_some() {
        milestone.description = request.description;
    }
    if let Some(date) = request.planned_date {
        milestone.planned_date = date;
    }
    if request.actual_date.is_some() {
        milestone.actual_date = request.actual_date;
    }
    if let Some(reached) = request.reached {
        milestone.reached = reached;
        if reached && milestone.actual_date.is_none() {
            milestone.actual_date = Some(today());
        }
    }

    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("milestones", &existing.milestones, &project.milestones);

    save(state, principal, &existing, project, changes).await
}

pub async fn delete_milestone(
    state: &AppState,
    principal: &Principal,
    id: &str,
    milestone_id: &str,
) -> Result<Project, AppError> {
    authorize(state, principal, Permission::ProjectsUpdate).await?;
    let existing = load_project(state, id).await?;
    ensure_manages(state, principal, &existing).await?;

    let mut project = existing.clone();
    project.milestones.retain(|m| m.id != milestone_id);
    if project.milestones.len() == existing.milestones.len() {
        return Err(AppError::not_found("Milestone", milestone_id));
    }
    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("milestones", &existing.milestones, &project.milestones);

    save(state, principal, &existing, project, changes).await
}

pub async fn stats(state: &AppState, principal: &Principal, id: &str) -> Result<ProjectStats, AppError> {
    authorize(state, principal, Permission::ProjectsRead).await?;
    let project = load_project(state, id).await?;
    let tasks = state.repo.list_project_tasks(id).await?;
    Ok(project_stats(&project, &tasks, today()))
}

pub async fn budget(state: &AppState, principal: &Principal, id: &str) -> Result<BudgetStatus, AppError> {
    authorize(state, principal, Permission::ProjectsRead).await?;
    let project = load_project(state, id).await?;
    Ok(budget_status(&project))
}

pub async fn progress(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<ProjectProgress, AppError> {
    authorize(state, principal, Permission::ProjectsRead).await?;
    let project = load_project(state, id).await?;
    let tasks = state.repo.list_project_tasks(id).await?;
    Ok(project_progress(&project, &tasks, today()))
}

pub async fn time_stats(
    state: &AppState,
    principal: &Principal,
    id: &str,
    range: DateRange,
) -> Result<ProjectTimeStats, AppError> {
    authorize(state, principal, Permission::ProjectsRead).await?;
    load_project(state, id).await?;

    let entries = state
        .repo
        .list_approved_entries(None, Some(id), range.from, range.to)
        .await?;
    let members = state
        .repo
        .list_all_members()
        .await?
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect::<HashMap<_, _>>();
    let tasks = state
        .repo
        .list_project_tasks(id)
        .await?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect::<HashMap<_, _>>();

    Ok(project_time_stats(id, &entries, &members, &tasks))
}

/// Requested code, upper-cased and checked for reuse, or the next free one.
async fn resolve_code(state: &AppState, requested: Option<String>) -> Result<String, AppError> {
    match requested.map(|c| c.trim().to_uppercase()) {
        Some(code) if !code.is_empty() => {
            if state.repo.project_code_exists(&code).await? {
                return Err(AppError::Duplicate(format!(
                    "Project code {} is already in use",
                    code
                )));
            }
            Ok(code)
        }
        _ => state.repo.next_project_code().await,
    }
}

/// Copy `source` with its milestones and tasks.
///
/// The copy starts from scratch: planning status, nothing consumed, milestones
/// unreached, tasks back to todo without assignees or logged hours. The acting
/// member leads it. Templates keep no members.
async fn copy_project(
    state: &AppState,
    principal: &Principal,
    source: &Project,
    request: CopyProjectRequest,
    default_name: String,
    as_template: bool,
) -> Result<Project, AppError> {
    let name = match request.name.map(|n| n.trim().to_string()) {
        Some(name) if name.is_empty() => {
            return Err(AppError::Validation("Project name is required".to_string()))
        }
        Some(name) => name,
        None => default_name,
    };
    let code = resolve_code(state, request.code).await?;
    let shift = request
        .planned_start
        .map(|start| start - source.planned_start)
        .unwrap_or_else(Duration::zero);

    let now = Utc::now();
    let project = Project {
        id: uuid::Uuid::new_v4().to_string(),
        code,
        name,
        description: source.description.clone(),
        status: ProjectStatus::Planning,
        priority: source.priority,
        planned_start: source.planned_start + shift,
        planned_end: source.planned_end + shift,
        actual_start: None,
        actual_end: None,
        allocated_budget: source.allocated_budget,
        consumed_budget: 0.0,
        lead_id: principal.member_id.clone(),
        member_ids: if as_template {
            Vec::new()
        } else {
            source.member_ids.clone()
        },
        milestones: source
            .milestones
            .iter()
            .map(|m| Milestone {
                id: uuid::Uuid::new_v4().to_string(),
                name: m.name.clone(),
                description: m.description.clone(),
                planned_date: m.planned_date + shift,
                actual_date: None,
                reached: false,
            })
            .collect(),
        tags: source.tags.clone(),
        history: Vec::new(),
        is_template: as_template,
        created_at: now,
        updated_at: now,
        version: 1,
    };

    let source_tasks = state.repo.list_project_tasks(&source.id).await?;
    let ids: HashMap<String, String> = source_tasks
        .iter()
        .map(|t| (t.id.clone(), uuid::Uuid::new_v4().to_string()))
        .collect();
    let tasks: Vec<Task> = source_tasks
        .into_iter()
        .filter_map(|t| {
            Some(Task {
                id: ids.get(&t.id)?.clone(),
                title: t.title,
                description: t.description,
                project_id: project.id.clone(),
                parent_id: t.parent_id.and_then(|p| ids.get(&p).cloned()),
                status: TaskStatus::Todo,
                priority: t.priority,
                assignee_ids: Vec::new(),
                estimated_hours: t.estimated_hours,
                actual_hours: 0.0,
                planned_start: t.planned_start.map(|d| d + shift),
                planned_end: t.planned_end.map(|d| d + shift),
                actual_start: None,
                actual_end: None,
                progress: 0,
                dependency_ids: t
                    .dependency_ids
                    .iter()
                    .filter_map(|d| ids.get(d).cloned())
                    .collect(),
                attachments: t.attachments,
                tags: t.tags,
                history: Vec::new(),
                created_at: now,
                updated_at: now,
                version: 1,
            })
        })
        .collect();

    state.repo.insert_project_with_tasks(&project, &tasks).await?;

    tracing::info!(
        project_id = %project.id,
        source_id = %source.id,
        tasks = tasks.len(),
        template = as_template,
        "Project copied"
    );
    if !as_template {
        notify_new_members(state, principal, &project, &[]).await;
    }
    index_project(state, &project).await;
    for task in &tasks {
        index_task(state, task).await;
    }
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Create, "projects")
            .document(&project.id)
            .actor(&principal.member_id),
    )
    .await;
    Ok(project)
}

/// Executives manage every project; anyone else only the projects they lead.
async fn ensure_manages(
    state: &AppState,
    principal: &Principal,
    project: &Project,
) -> Result<(), AppError> {
    if principal.is_executive() || principal.is(&project.lead_id) {
        return Ok(());
    }
    Err(deny(
        state,
        principal,
        "projects",
        format!("Only the lead of project {} can change it", project.code),
    )
    .await)
}

/// Append `changes` to the history and persist, then fan out side effects.
async fn save(
    state: &AppState,
    principal: &Principal,
    existing: &Project,
    mut project: Project,
    changes: ChangeSet<'_>,
) -> Result<Project, AppError> {
    if changes.is_empty() {
        return Ok(project);
    }
    let records = changes.into_records();
    project.history.extend(records.iter().cloned());

    let project = state.repo.update_project(project).await?;

    notify_new_members(state, principal, &project, &existing.member_ids).await;
    index_project(state, &project).await;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Update, "projects")
            .document(&project.id)
            .actor(&principal.member_id)
            .changes(records),
    )
    .await;
    Ok(project)
}

async fn notify_new_members(
    state: &AppState,
    principal: &Principal,
    project: &Project,
    before: &[String],
) {
    let batch = added_ids(before, &project.member_ids)
        .into_iter()
        .filter(|id| !principal.is(id))
        .map(|id| {
            NewNotification::new(
                id,
                NotificationKind::Assignment,
                "New project assignment",
                format!("{} added you to project {}", principal.name, project.name),
            )
            .on(ResourceType::Project, &project.id)
        })
        .collect();
    notify(state, batch).await;
}
