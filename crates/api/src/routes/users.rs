//! User management routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use helpdesk_shared::{NewUser, User, UserPatch, UserRole};
use serde::Deserialize;
use uuid::Uuid;

use super::{check_length, MAX_FIELD_LENGTH};
use crate::{
    auth::{hash_password, validate_password, AuthUser},
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<String>,
}

fn parse_role(value: &str) -> ApiResult<UserRole> {
    value
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid role: {value}")))
}

/// Only a superadmin may hand out the superadmin role
fn check_grantable(auth_user: &AuthUser, role: UserRole) -> ApiResult<()> {
    if role == UserRole::Superadmin && auth_user.role != UserRole::Superadmin {
        tracing::warn!(
            user_id = %auth_user.user_id,
            "Admin tried to grant the superadmin role"
        );
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// List all users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<User>>> {
    auth_user.require_admin()?;
    Ok(Json(state.store.list_users().await?))
}

/// Create a user account
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    auth_user.require_admin()?;

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or(ApiError::MissingField("name"))?;
    let email = req
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or(ApiError::MissingField("email"))?;
    if !email.contains('@') {
        return Err(ApiError::Validation("Invalid email address".into()));
    }
    check_length(&name, "name", MAX_FIELD_LENGTH)?;
    check_length(&email, "email", MAX_FIELD_LENGTH)?;
    let password = req.password.ok_or(ApiError::MissingField("password"))?;
    validate_password(&password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let role = match req.role.as_deref().map(str::trim) {
        Some(role) if !role.is_empty() => parse_role(role)?,
        _ => UserRole::default(),
    };
    check_grantable(&auth_user, role)?;

    let password_hash = hash_password(&password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::Internal
    })?;

    let user = state
        .store
        .create_user(NewUser {
            name,
            email,
            password_hash,
            role,
        })
        .await?;

    tracing::info!(
        user_id = %user.id,
        role = %user.role,
        created_by = %auth_user.user_id,
        "User created"
    );

    Ok((StatusCode::CREATED, Json(user)))
}

/// Change a user's name or role
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    auth_user.require_admin()?;

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if let Some(name) = &name {
        check_length(name, "name", MAX_FIELD_LENGTH)?;
    }

    let role = req
        .role
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(parse_role)
        .transpose()?;

    if let Some(role) = role {
        if auth_user.user_id == user_id && role != auth_user.role {
            return Err(ApiError::BadRequest(
                "Cannot change your own role".to_string(),
            ));
        }
        check_grantable(&auth_user, role)?;
    }

    let target = state.store.get_user(user_id).await?;
    // Admins can't modify superadmins
    if target.role == UserRole::Superadmin && auth_user.role != UserRole::Superadmin {
        return Err(ApiError::Forbidden);
    }

    let patch = UserPatch { name, role };
    let user = state.store.update_user(user_id, patch).await?;

    tracing::info!(
        user_id = %user.id,
        role = %user.role,
        updated_by = %auth_user.user_id,
        "User updated"
    );

    Ok(Json(user))
}

/// Delete a user account
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    auth_user.require_superadmin()?;

    // Can't delete yourself
    if auth_user.user_id == user_id {
        return Err(ApiError::BadRequest("Cannot delete yourself".to_string()));
    }

    state.store.delete_user(user_id).await?;

    tracing::info!(
        user_id = %user_id,
        deleted_by = %auth_user.user_id,
        "User deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}
