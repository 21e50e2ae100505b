//! Technician roster routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use helpdesk_shared::{NewTechnician, Technician, TechnicianPatch};
use serde::Deserialize;
use uuid::Uuid;

use super::{check_length, MAX_FIELD_LENGTH};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateTechnicianRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTechnicianRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub active: Option<bool>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_fields(display_name: Option<&str>, email: Option<&str>) -> ApiResult<()> {
    if let Some(name) = display_name {
        check_length(name, "display_name", MAX_FIELD_LENGTH)?;
    }
    if let Some(email) = email {
        check_length(email, "email", MAX_FIELD_LENGTH)?;
    }
    Ok(())
}

/// A linked account must exist
async fn check_linked_user(state: &AppState, user_id: Option<Uuid>) -> ApiResult<()> {
    let Some(user_id) = user_id else {
        return Ok(());
    };
    match state.store.get_user(user_id).await {
        Ok(_) => Ok(()),
        Err(helpdesk_shared::StoreError::NotFound(_)) => {
            Err(ApiError::Validation("Unknown user_id".into()))
        }
        Err(err) => Err(err.into()),
    }
}

/// All technicians, active first
pub async fn list_technicians(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Technician>>> {
    auth_user.require_admin()?;
    Ok(Json(state.store.list_technicians().await?))
}

pub async fn create_technician(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateTechnicianRequest>,
) -> ApiResult<(StatusCode, Json<Technician>)> {
    auth_user.require_admin()?;

    let display_name = clean(req.display_name).ok_or(ApiError::MissingField("display_name"))?;
    let email = clean(req.email).map(|e| e.to_lowercase());
    check_fields(Some(&display_name), email.as_deref())?;
    check_linked_user(&state, req.user_id).await?;

    let tech = state
        .store
        .create_technician(NewTechnician {
            display_name,
            email,
            user_id: req.user_id,
            active: req.active.unwrap_or(true),
        })
        .await?;

    tracing::info!(
        technician_id = %tech.id,
        linked_user = ?tech.user_id,
        created_by = %auth_user.user_id,
        "Technician created"
    );

    Ok((StatusCode::CREATED, Json(tech)))
}

pub async fn update_technician(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(technician_id): Path<Uuid>,
    Json(req): Json<UpdateTechnicianRequest>,
) -> ApiResult<Json<Technician>> {
    auth_user.require_admin()?;
    let display_name = clean(req.display_name);
    let email = clean(req.email).map(|e| e.to_lowercase());
    check_fields(display_name.as_deref(), email.as_deref())?;
    check_linked_user(&state, req.user_id).await?;

    let tech = state
        .store
        .update_technician(
            technician_id,
            TechnicianPatch {
                display_name,
                email,
                user_id: req.user_id,
                active: req.active,
            },
        )
        .await?;

    tracing::info!(
        technician_id = %tech.id,
        active = tech.active,
        updated_by = %auth_user.user_id,
        "Technician updated"
    );

    Ok(Json(tech))
}

/// Remove a technician; their tickets become unassigned
pub async fn delete_technician(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(technician_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    auth_user.require_admin()?;

    state.store.delete_technician(technician_id).await?;

    tracing::info!(
        technician_id = %technician_id,
        deleted_by = %auth_user.user_id,
        "Technician deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}
