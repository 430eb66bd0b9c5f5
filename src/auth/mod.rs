//! Authentication: PSK gate for the API and the per-request acting member.
//!
//! The PSK comparison is constant-time to mitigate timing attacks.

use std::collections::HashSet;

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::{codes, AppError, AppErrorWithRevision, ErrorDetails, ErrorResponse};
use crate::models::{Member, Role, SecondaryRole};
use crate::rbac::{effective_permissions, Permission};
use crate::AppState;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming the acting member.
pub const MEMBER_ID_HEADER: &str = "x-member-id";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // No PSK configured: dev mode
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(provided_key) => {
            if constant_time_compare(&provided_key, &expected) {
                next.run(request).await
            } else {
                unauthorized_response("Invalid API key")
            }
        }
        None => {
            let bearer = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            match bearer {
                Some(bearer_key) if constant_time_compare(&bearer_key, &expected) => {
                    next.run(request).await
                }
                _ => unauthorized_response("Missing or invalid API key"),
            }
        }
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorDetails {
            code: codes::UNAUTHORIZED.to_string(),
            message: message.to_string(),
            details: None,
        },
        revision_id: 0,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// The member on whose behalf a request runs.
#[derive(Debug, Clone)]
pub struct Principal {
    pub member_id: String,
    pub name: String,
    pub role: Role,
    pub secondary_roles: Vec<SecondaryRole>,
    permissions: HashSet<Permission>,
}

impl Principal {
    pub fn from_member(member: &Member) -> Self {
        Self {
            member_id: member.id.clone(),
            name: member.full_name(),
            role: member.role,
            secondary_roles: member.secondary_roles.clone(),
            permissions: effective_permissions(member.role, &member.secondary_roles),
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins and directors see across all projects.
    pub fn is_executive(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Director)
    }

    pub fn is(&self, member_id: &str) -> bool {
        self.member_id == member_id
    }
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = AppErrorWithRevision;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let member_id = parts
            .headers
            .get(MEMBER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(format!("Missing {} header", MEMBER_ID_HEADER))
            })?;

        let member = state
            .repo
            .get_member(member_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized(format!("Unknown member {}", member_id)))?;

        if !member.is_active() {
            return Err(AppError::Unauthorized(format!(
                "Member {} is not active",
                member_id
            ))
            .into());
        }

        Ok(Principal::from_member(&member))
    }
}
