//! Site settings routes

use std::collections::BTreeMap;

use axum::{
    extract::{Extension, State},
    Json,
};
use serde_json::Value;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

const MAX_KEY_LENGTH: usize = 100;
const MAX_VALUE_LENGTH: usize = 10_000;

/// Flatten a JSON object into string settings. Strings are stored as-is,
/// `null` as empty, anything else as its JSON text.
fn to_settings(body: serde_json::Map<String, Value>) -> ApiResult<BTreeMap<String, String>> {
    body.into_iter()
        .map(|(key, value)| {
            let key = key.trim().to_string();
            if key.is_empty() || key.len() > MAX_KEY_LENGTH {
                return Err(ApiError::Validation(format!("Invalid setting key: {key:?}")));
            }
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            if value.len() > MAX_VALUE_LENGTH {
                return Err(ApiError::Validation(format!("Setting {key} is too long")));
            }
            Ok((key, value))
        })
        .collect()
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    auth_user.require_admin()?;
    Ok(Json(state.store.settings().await?))
}

/// Upsert the given keys; returns the full settings map
pub async fn put_settings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<serde_json::Map<String, Value>>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    auth_user.require_admin()?;

    let updates = to_settings(body)?;
    let keys: Vec<&str> = updates.keys().map(String::as_str).collect();
    tracing::info!(keys = ?keys, updated_by = %auth_user.user_id, "Settings updated");

    state.store.put_settings(updates).await?;
    Ok(Json(state.store.settings().await?))
}
