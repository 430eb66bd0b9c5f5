//! Comments with `@mention` resolution and notification fan-out.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use super::{authorize, deny, load_project, load_task, load_timesheet, notify, record_audit};
use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::{
    AuditAction, Channel, Comment, CommentBodyRequest, CommentQuery, CreateCommentRequest, Member,
    NewAuditLog, NewNotification, NotificationKind, ResourceType,
};
use crate::rbac::Permission;
use crate::AppState;

const MAX_BODY_LEN: usize = 5000;

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@(\w[\w.\-]*)").expect("mention pattern is valid"))
}

/// Ids of the members named by `@word` tokens in `body`.
///
/// A word matches a member's first name, last name or email local part, ignoring case.
pub fn resolve_mentions(body: &str, members: &[Member]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for capture in mention_pattern().captures_iter(body) {
        let word = capture[1].trim_end_matches(['.', '-']).to_lowercase();
        for member in members {
            let matches = member.first_name.to_lowercase() == word
                || member.last_name.to_lowercase() == word
                || member.email_handle().to_lowercase() == word;
            if matches && !ids.contains(&member.id) {
                ids.push(member.id.clone());
            }
        }
    }
    ids
}

/// What a comment hangs off: its title for messages and who follows it.
struct Thread {
    title: String,
    audience: Vec<String>,
}

pub async fn list(
    state: &AppState,
    principal: &Principal,
    query: CommentQuery,
) -> Result<Vec<Comment>, AppError> {
    authorize(state, principal, Permission::CommentsRead).await?;
    load_thread(state, query.resource_type, &query.resource_id).await?;
    state
        .repo
        .list_comments(query.resource_type, &query.resource_id)
        .await
}

pub async fn create(
    state: &AppState,
    principal: &Principal,
    request: CreateCommentRequest,
) -> Result<Comment, AppError> {
    authorize(state, principal, Permission::CommentsCreate).await?;
    if let Some(parent_id) = &request.reply_to {
        let parent = load_comment(state, parent_id).await?;
        if parent.resource_type != request.resource_type
            || parent.resource_id != request.resource_id
        {
            return Err(AppError::Validation(
                "A reply must target the same resource as its parent".to_string(),
            ));
        }
    }
    post(
        state,
        principal,
        request.resource_type,
        request.resource_id,
        request.body,
        request.reply_to,
    )
    .await
}

/// Reply to a comment; the reply lands on the parent's resource.
pub async fn reply(
    state: &AppState,
    principal: &Principal,
    parent_id: &str,
    request: CommentBodyRequest,
) -> Result<Comment, AppError> {
    authorize(state, principal, Permission::CommentsCreate).await?;
    let parent = load_comment(state, parent_id).await?;
    post(
        state,
        principal,
        parent.resource_type,
        parent.resource_id,
        request.body,
        Some(parent.id),
    )
    .await
}

/// Only the author may edit. Newly mentioned members are notified.
pub async fn update(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: CommentBodyRequest,
) -> Result<Comment, AppError> {
    let mut comment = load_comment(state, id).await?;
    if !principal.is(&comment.author_id) {
        return Err(deny(
            state,
            principal,
            "comments",
            "Only the author can edit a comment".to_string(),
        )
        .await);
    }

    let body = validate_body(&request.body)?;
    let thread = load_thread(state, comment.resource_type, &comment.resource_id).await?;
    let members = state.repo.list_active_members().await?;
    let mention_ids = resolve_mentions(&body, &members);
    let fresh: Vec<String> = mention_ids
        .iter()
        .filter(|id| !comment.mention_ids.contains(*id))
        .cloned()
        .collect();

    let now = Utc::now();
    comment.body = body;
    comment.mention_ids = mention_ids;
    comment.edited = true;
    comment.edited_at = Some(now);
    comment.updated_at = now;
    state.repo.update_comment(&comment).await?;

    notify(
        state,
        mention_notifications(principal, &comment, &thread, &fresh),
    )
    .await;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Update, "comments")
            .document(&comment.id)
            .actor(&principal.member_id),
    )
    .await;
    Ok(comment)
}

/// The author or an administrator may delete; replies go with it.
pub async fn delete(state: &AppState, principal: &Principal, id: &str) -> Result<(), AppError> {
    let comment = load_comment(state, id).await?;
    if !principal.is(&comment.author_id) && !principal.is_admin() {
        return Err(deny(
            state,
            principal,
            "comments",
            "Only the author or an administrator can delete a comment".to_string(),
        )
        .await);
    }

    state.repo.delete_comment(id).await?;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Delete, "comments")
            .document(id)
            .actor(&principal.member_id)
            .snapshot(&comment),
    )
    .await;
    Ok(())
}

async fn post(
    state: &AppState,
    principal: &Principal,
    resource_type: ResourceType,
    resource_id: String,
    body: String,
    reply_to: Option<String>,
) -> Result<Comment, AppError> {
    let body = validate_body(&body)?;
    let thread = load_thread(state, resource_type, &resource_id).await?;
    let members = state.repo.list_active_members().await?;

    let now = Utc::now();
    let comment = Comment {
        id: uuid::Uuid::new_v4().to_string(),
        resource_type,
        resource_id,
        author_id: principal.member_id.clone(),
        mention_ids: resolve_mentions(&body, &members),
        body,
        reply_to,
        edited: false,
        edited_at: None,
        created_at: now,
        updated_at: now,
    };
    state.repo.insert_comment(&comment).await?;

    tracing::debug!(
        comment_id = %comment.id,
        mentions = comment.mention_ids.len(),
        "Comment posted"
    );

    let mut batch = mention_notifications(principal, &comment, &thread, &comment.mention_ids);
    batch.extend(
        thread
            .audience
            .iter()
            .filter(|id| !principal.is(id) && !comment.mention_ids.contains(*id))
            .map(|id| {
                NewNotification::new(
                    id,
                    NotificationKind::Comment,
                    "New comment",
                    format!("{} commented on {}", principal.name, thread.title),
                )
                .on(comment.resource_type, &comment.resource_id)
            }),
    );
    notify(state, batch).await;

    record_audit(
        state,
        NewAuditLog::new(AuditAction::Create, "comments")
            .document(&comment.id)
            .actor(&principal.member_id),
    )
    .await;
    Ok(comment)
}

fn mention_notifications(
    principal: &Principal,
    comment: &Comment,
    thread: &Thread,
    mention_ids: &[String],
) -> Vec<NewNotification> {
    mention_ids
        .iter()
        .filter(|id| !principal.is(id))
        .map(|id| {
            NewNotification::new(
                id,
                NotificationKind::Mention,
                "You were mentioned",
                format!("{} mentioned you on {}", principal.name, thread.title),
            )
            .on(comment.resource_type, &comment.resource_id)
            .via(Channel::AppAndEmail)
        })
        .collect()
}

async fn load_thread(
    state: &AppState,
    resource_type: ResourceType,
    resource_id: &str,
) -> Result<Thread, AppError> {
    match resource_type {
        ResourceType::Project => {
            let project = load_project(state, resource_id).await?;
            let mut audience = vec![project.lead_id.clone()];
            audience.extend(
                project
                    .member_ids
                    .iter()
                    .filter(|id| **id != project.lead_id)
                    .cloned(),
            );
            Ok(Thread {
                title: format!("project {}", project.name),
                audience,
            })
        }
        ResourceType::Task => {
            let task = load_task(state, resource_id).await?;
            Ok(Thread {
                title: format!("task {}", task.title),
                audience: task.assignee_ids,
            })
        }
        ResourceType::Timesheet => {
            let entry = load_timesheet(state, resource_id).await?;
            Ok(Thread {
                title: format!("the timesheet entry of {}", entry.date),
                audience: vec![entry.member_id],
            })
        }
    }
}

async fn load_comment(state: &AppState, id: &str) -> Result<Comment, AppError> {
    state
        .repo
        .get_comment(id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment", id))
}

fn validate_body(body: &str) -> Result<String, AppError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::Validation("Comment body is required".to_string()));
    }
    if body.chars().count() > MAX_BODY_LEN {
        return Err(AppError::Validation(format!(
            "Comment body must not exceed {} characters",
            MAX_BODY_LEN
        )));
    }
    Ok(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testing::member;

    fn team() -> Vec<Member> {
        let mut ada = member("m1", 35.0, 50.0);
        ada.first_name = "Ada".to_string();
        ada.last_name = "Lovelace".to_string();
        ada.email = "ada.l@example.com".to_string();
        let mut alan = member("m2", 35.0, 50.0);
        alan.first_name = "Alan".to_string();
        alan.last_name = "Turing".to_string();
        alan.email = "aturing@example.com".to_string();
        vec![ada, alan]
    }

    #[test]
    fn test_mentions_match_names_and_handles() {
        let members = team();
        assert_eq!(resolve_mentions("Thanks @ada!", &members), vec!["m1"]);
        assert_eq!(resolve_mentions("cc @TURING", &members), vec!["m2"]);
        assert_eq!(resolve_mentions("ping @ada.l.", &members), vec!["m1"]);
        assert_eq!(
            resolve_mentions("@aturing and @lovelace and @ada", &members),
            vec!["m2", "m1"]
        );
    }

    #[test]
    fn test_unknown_mentions_are_ignored() {
        let members = team();
        assert!(resolve_mentions("mail me at someone@example.com", &members).is_empty());
        assert!(resolve_mentions("@grace", &members).is_empty());
    }

    #[test]
    fn test_body_validation() {
        assert_eq!(validate_body("  hello ").unwrap(), "hello");
        assert!(validate_body("   ").is_err());
        assert!(validate_body(&"x".repeat(MAX_BODY_LEN + 1)).is_err());
    }
}
