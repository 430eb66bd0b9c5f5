//! Task lifecycle: hierarchy, dependencies, progress and attachments.

use std::collections::HashMap;

use chrono::Utc;

use super::{
    added_ids, authorize, check_version, dedup_ids, deny, index_task, load_member, load_project,
    load_task, notify, record_audit, today, unindex,
};
use crate::analytics::progress::{
    can_start, creates_cycle, normalized_progress, task_stats, CanStart, TaskStats,
};
use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::{
    Attachment, AttachmentRequest, AuditAction, ChangeSet, CreateTaskRequest, NewAuditLog,
    NewNotification, NotificationKind, Page, PageQuery, ProgressRequest, ResourceType, Task,
    TaskFilter, TaskStatus, UpdateTaskRequest,
};
use crate::rbac::Permission;
use crate::search::SearchKind;
use crate::AppState;

const MAX_TITLE_LEN: usize = 200;

pub async fn list(
    state: &AppState,
    principal: &Principal,
    filter: TaskFilter,
) -> Result<Page<Task>, AppError> {
    authorize(state, principal, Permission::TasksRead).await?;
    let (limit, offset) = PageQuery {
        page: filter.page,
        page_size: filter.page_size,
    }
    .resolve(state.config.page_size);

    let (tasks, total) = state.repo.list_tasks(&filter, limit, offset).await?;
    Ok(Page::new(tasks, total, limit, offset))
}

pub async fn get(state: &AppState, principal: &Principal, id: &str) -> Result<Task, AppError> {
    authorize(state, principal, Permission::TasksRead).await?;
    load_task(state, id).await
}

pub async fn subtasks(state: &AppState, principal: &Principal, id: &str) -> Result<Vec<Task>, AppError> {
    authorize(state, principal, Permission::TasksRead).await?;
    load_task(state, id).await?;
    state.repo.list_subtasks(id).await
}

pub async fn create(
    state: &AppState,
    principal: &Principal,
    request: CreateTaskRequest,
) -> Result<Task, AppError> {
    authorize(state, principal, Permission::TasksCreate).await?;
    if !request.assignee_ids.is_empty() {
        authorize(state, principal, Permission::TasksAssign).await?;
    }

    let title = validate_title(&request.title)?;
    let project = load_project(state, &request.project_id).await?;
    let id = uuid::Uuid::new_v4().to_string();

    if let Some(parent_id) = &request.parent_id {
        check_parent(state, &id, &project.id, parent_id).await?;
    }
    let assignee_ids = dedup_ids(request.assignee_ids);
    for member_id in &assignee_ids {
        load_member(state, member_id).await?;
    }
    let dependency_ids = dedup_ids(request.dependency_ids);
    check_dependencies(state, &id, &project.id, &dependency_ids).await?;

    let now = Utc::now();
    let mut task = Task {
        id,
        title,
        description: request.description,
        project_id: project.id.clone(),
        parent_id: request.parent_id,
        status: request.status,
        priority: request.priority,
        assignee_ids,
        estimated_hours: request.estimated_hours,
        actual_hours: 0.0,
        planned_start: request.planned_start,
        planned_end: request.planned_end,
        actual_start: None,
        actual_end: None,
        progress: normalized_progress(request.status, request.progress),
        dependency_ids,
        attachments: Vec::new(),
        tags: request.tags,
        history: Vec::new(),
        created_at: now,
        updated_at: now,
        version: 1,
    };
    stamp_actual_dates(&mut task);
    validate_figures(&task)?;

    state.repo.insert_task(&task).await?;
    tracing::info!(task_id = %task.id, project_id = %task.project_id, "Task created");

    notify_new_assignees(state, principal, &task, &[]).await;
    index_task(state, &task).await;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Create, "tasks")
            .document(&task.id)
            .actor(&principal.member_id),
    )
    .await;
    Ok(task)
}

pub async fn update(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: UpdateTaskRequest,
) -> Result<Task, AppError> {
    authorize(state, principal, Permission::TasksUpdate).await?;
    let existing = load_task(state, id).await?;
    ensure_can_edit(state, principal, &existing).await?;
    check_version(request.expected_version, existing.version)?;

    let mut task = existing.clone();
    if let Some(title) = request.title {
        task.title = validate_title(&title)?;
    }
    if request.description.is_some() {
        task.description = request.description;
    }
    if let Some(status) = request.status {
        task.status = status;
    }
    if let Some(priority) = request.priority {
        task.priority = priority;
    }
    if let Some(assignee_ids) = request.assignee_ids {
        let assignee_ids = dedup_ids(assignee_ids);
        if assignee_ids != task.assignee_ids {
            authorize(state, principal, Permission::TasksAssign).await?;
            for member_id in added_ids(&existing.assignee_ids, &assignee_ids) {
                load_member(state, member_id).await?;
            }
            task.assignee_ids = assignee_ids;
        }
    }
    if let Some(hours) = request.estimated_hours {
        task.estimated_hours = hours;
    }
    if request.planned_start.is_some() {
        task.planned_start = request.planned_start;
    }
    if request.planned_end.is_some() {
        task.planned_end = request.planned_end;
    }
    if request.actual_start.is_some() {
        task.actual_start = request.actual_start;
    }
    if request.actual_end.is_some() {
        task.actual_end = request.actual_end;
    }
    if let Some(dependency_ids) = request.dependency_ids {
        let dependency_ids = dedup_ids(dependency_ids);
        if dependency_ids != task.dependency_ids {
            check_dependencies(state, &task.id, &task.project_id, &dependency_ids).await?;
            task.dependency_ids = dependency_ids;
        }
    }
    if let Some(tags) = request.tags {
        task.tags = tags;
    }
    let requested = request.progress.unwrap_or(task.progress);
    if !(0..=100).contains(&requested) {
        return Err(AppError::Validation(
            "Progress must be between 0 and 100".to_string(),
        ));
    }
    task.progress = normalized_progress(task.status, requested);
    stamp_actual_dates(&mut task);
    validate_figures(&task)?;

    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("title", &existing.title, &task.title);
    changes.track("description", &existing.description, &task.description);
    changes.track("status", &existing.status, &task.status);
    changes.track("priority", &existing.priority, &task.priority);
    changes.track("assigneeIds", &existing.assignee_ids, &task.assignee_ids);
    changes.track("estimatedHours", &existing.estimated_hours, &task.estimated_hours);
    changes.track("plannedStart", &existing.planned_start, &task.planned_start);
    changes.track("plannedEnd", &existing.planned_end, &task.planned_end);
    changes.track("actualStart", &existing.actual_start, &task.actual_start);
    changes.track("actualEnd", &existing.actual_end, &task.actual_end);
    changes.track("progress", &existing.progress, &task.progress);
    changes.track("dependencyIds", &existing.dependency_ids, &task.dependency_ids);
    changes.track("tags", &existing.tags, &task.tags);

    save(state, principal, &existing, task, changes).await
}

/// Update progress only; the status still decides the stored value.
pub async fn update_progress(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: ProgressRequest,
) -> Result<Task, AppError> {
    authorize(state, principal, Permission::TasksUpdate).await?;
    let existing = load_task(state, id).await?;
    ensure_can_edit(state, principal, &existing).await?;
    check_version(request.expected_version, existing.version)?;

    if !(0..=100).contains(&request.progress) {
        return Err(AppError::Validation(
            "Progress must be between 0 and 100".to_string(),
        ));
    }

    let mut task = existing.clone();
    task.progress = normalized_progress(task.status, request.progress);
    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("progress", &existing.progress, &task.progress);

    save(state, principal, &existing, task, changes).await
}

/// Delete a task that has no subtasks and that no other task depends on.
pub async fn delete(state: &AppState, principal: &Principal, id: &str) -> Result<(), AppError> {
    authorize(state, principal, Permission::TasksDelete).await?;
    let task = load_task(state, id).await?;

    let (subtasks, dependants) = state.repo.task_dependents(id).await?;
    if subtasks > 0 {
        return Err(AppError::Validation(format!(
            "Task {} still has {} subtask(s)",
            id, subtasks
        )));
    }
    if dependants > 0 {
        return Err(AppError::Validation(format!(
            "{} task(s) depend on task {}",
            dependants, id
        )));
    }

    state.repo.delete_task(id).await?;
    tracing::info!(task_id = id, "Task deleted");
    unindex(state, SearchKind::Task, id).await;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Delete, "tasks")
            .document(id)
            .actor(&principal.member_id)
            .snapshot(&task),
    )
    .await;
    Ok(())
}

pub async fn stats(state: &AppState, principal: &Principal, id: &str) -> Result<TaskStats, AppError> {
    authorize(state, principal, Permission::TasksRead).await?;
    let task = load_task(state, id).await?;
    let subtasks = state.repo.list_subtasks(id).await?;
    let dependencies = state.repo.get_tasks(&task.dependency_ids).await?;
    Ok(task_stats(&task, &subtasks, &dependencies))
}

pub async fn can_start_task(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<CanStart, AppError> {
    authorize(state, principal, Permission::TasksRead).await?;
    let task = load_task(state, id).await?;
    let dependencies = state.repo.get_tasks(&task.dependency_ids).await?;
    Ok(can_start(&dependencies))
}

pub async fn add_attachment(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: AttachmentRequest,
) -> Result<Task, AppError> {
    authorize(state, principal, Permission::TasksUpdate).await?;
    let existing = load_task(state, id).await?;
    ensure_can_edit(state, principal, &existing).await?;

    let name = request.name.trim().to_string();
    if name.is_empty() || request.url.trim().is_empty() {
        return Err(AppError::Validation(
            "Attachment name and url are required".to_string(),
        ));
    }
    if request.size < 0 {
        return Err(AppError::Validation(
            "Attachment size must not be negative".to_string(),
        ));
    }
    if existing.attachments.iter().any(|a| a.name == name) {
        return Err(AppError::Duplicate(format!(
            "Task {} already has an attachment named {}",
            id, name
        )));
    }

    let mut task = existing.clone();
    task.attachments.push(Attachment {
        name,
        url: request.url.trim().to_string(),
        mime_type: request.mime_type,
        size: request.size,
        uploaded_by: principal.member_id.clone(),
        uploaded_at: Utc::now(),
    });
    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("attachments", &existing.attachments, &task.attachments);

    save(state, principal, &existing, task, changes).await
}

pub async fn delete_attachment(
    state: &AppState,
    principal: &Principal,
    id: &str,
    name: &str,
) -> Result<Task, AppError> {
    authorize(state, principal, Permission::TasksUpdate).await?;
    let existing = load_task(state, id).await?;
    ensure_can_edit(state, principal, &existing).await?;

    let mut task = existing.clone();
    task.attachments.retain(|a| a.name != name);
    if task.attachments.len() == existing.attachments.len() {
        return Err(AppError::not_found("Attachment", name));
    }
    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("attachments", &existing.attachments, &task.attachments);

    save(state, principal, &existing, task, changes).await
}

/// Members without `tasks:create` may only edit tasks assigned to them.
async fn ensure_can_edit(
    state: &AppState,
    principal: &Principal,
    task: &Task,
) -> Result<(), AppError> {
    if principal.can(Permission::TasksCreate) || task.is_assigned_to(&principal.member_id) {
        return Ok(());
    }
    Err(deny(
        state,
        principal,
        "tasks",
        format!("Task {} is not assigned to you", task.id),
    )
    .await)
}

async fn save(
    state: &AppState,
    principal: &Principal,
    existing: &Task,
    mut task: Task,
    changes: ChangeSet<'_>,
) -> Result<Task, AppError> {
    if changes.is_empty() {
        return Ok(task);
    }
    let records = changes.into_records();
    task.history.extend(records.iter().cloned());

    let task = state.repo.update_task(task).await?;

    notify_new_assignees(state, principal, &task, &existing.assignee_ids).await;
    index_task(state, &task).await;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Update, "tasks")
            .document(&task.id)
            .actor(&principal.member_id)
            .changes(records),
    )
    .await;
    Ok(task)
}

async fn notify_new_assignees(state: &AppState, principal: &Principal, task: &Task, before: &[String]) {
    let batch = added_ids(before, &task.assignee_ids)
        .into_iter()
        .filter(|id| !principal.is(id))
        .map(|id| {
            NewNotification::new(
                id,
                NotificationKind::Assignment,
                "New task assignment",
                format!("{} assigned you to {}", principal.name, task.title),
            )
            .on(ResourceType::Task, &task.id)
        })
        .collect();
    notify(state, batch).await;
}

/// The parent must be a top-level task of the same project.
async fn check_parent(
    state: &AppState,
    task_id: &str,
    project_id: &str,
    parent_id: &str,
) -> Result<(), AppError> {
    if parent_id == task_id {
        return Err(AppError::Validation(
            "A task cannot be its own parent".to_string(),
        ));
    }
    let parent = load_task(state, parent_id).await?;
    if parent.project_id != project_id {
        return Err(AppError::Validation(
            "Parent task must belong to the same project".to_string(),
        ));
    }
    if parent.parent_id.is_some() {
        return Err(AppError::Validation(
            "Subtasks cannot have subtasks of their own".to_string(),
        ));
    }
    Ok(())
}

/// Dependencies must be other tasks of the same project and must not close a cycle.
async fn check_dependencies(
    state: &AppState,
    task_id: &str,
    project_id: &str,
    dependency_ids: &[String],
) -> Result<(), AppError> {
    if dependency_ids.is_empty() {
        return Ok(());
    }
    if dependency_ids.iter().any(|d| d == task_id) {
        return Err(AppError::Validation(
            "A task cannot depend on itself".to_string(),
        ));
    }

    let graph: HashMap<String, Vec<String>> = state
        .repo
        .list_project_tasks(project_id)
        .await?
        .into_iter()
        .map(|t| (t.id, t.dependency_ids))
        .collect();

    for dep in dependency_ids {
        if !graph.contains_key(dep) {
            return match state.repo.get_task(dep).await? {
                Some(_) => Err(AppError::Validation(format!(
                    "Dependency {} belongs to another project",
                    dep
                ))),
                None => Err(AppError::not_found("Task", dep)),
            };
        }
    }

    if creates_cycle(task_id, dependency_ids, &graph) {
        return Err(AppError::Validation(
            "Dependencies would create a cycle".to_string(),
        ));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Task title must be between 1 and {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn validate_figures(task: &Task) -> Result<(), AppError> {
    if task.estimated_hours < 0.0 {
        return Err(AppError::Validation(
            "Estimated hours must not be negative".to_string(),
        ));
    }
    if let (Some(start), Some(end)) = (task.planned_start, task.planned_end) {
        if end < start {
            return Err(AppError::Validation(
                "Planned end must not precede planned start".to_string(),
            ));
        }
    }
    if let (Some(start), Some(end)) = (task.actual_start, task.actual_end) {
        if end < start {
            return Err(AppError::Validation(
                "Actual end must not precede actual start".to_string(),
            ));
        }
    }
    Ok(())
}

/// Starting work stamps the actual start; finishing stamps the actual end.
fn stamp_actual_dates(task: &mut Task) {
    if task.status != TaskStatus::Todo && task.actual_start.is_none() {
        task.actual_start = Some(today());
    }
    if task.status == TaskStatus::Done && task.actual_end.is_none() {
        task.actual_end = Some(today());
    }
}
