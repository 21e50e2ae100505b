//! Authentication routes

use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use helpdesk_shared::User;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{verify_password, AuthUser, SESSION_COOKIE},
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Floor on login latency so unknown emails and wrong passwords look alike
const MIN_LOGIN_TIME: Duration = Duration::from_millis(300);

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub ok: bool,
    pub token: String,
    pub expires_in: i64,
    pub user: User,
}

fn session_cookie(state: &AppState, value: &str, max_age: i64) -> ApiResult<HeaderValue> {
    let mut cookie =
        format!("{SESSION_COOKIE}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}");
    if state.config.session_cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| {
        tracing::error!(error = %e, "Session cookie is not a valid header value");
        ApiError::Internal
    })
}

/// Sign in with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    let start = Instant::now();
    let result = login_inner(&state, req).await;

    let elapsed = start.elapsed();
    if elapsed < MIN_LOGIN_TIME {
        tokio::time::sleep(MIN_LOGIN_TIME - elapsed).await;
    }

    result
}

async fn login_inner(state: &AppState, req: LoginRequest) -> ApiResult<Response> {
    let email = req
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or(ApiError::MissingField("email"))?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or(ApiError::MissingField("password"))?;

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        tracing::info!(email = %email, "Login failed: unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let valid = verify_password(&password, &user.password_hash).map_err(|e| {
        tracing::error!(user_id = %user.id, error = %e, "Stored password hash is unreadable");
        ApiError::Internal
    })?;
    if !valid {
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .jwt_manager
        .generate_session_token(user.id, &user.name, &user.email, user.role)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to sign session token");
            ApiError::Internal
        })?;
    let expires_in = state.jwt_manager.expiry_seconds();
    let cookie = session_cookie(state, &token, expires_in)?;

    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            ok: true,
            token,
            expires_in,
            user,
        }),
    )
        .into_response())
}

/// Clear the session cookie.
///
/// Sessions are stateless JWTs, so this only ends the cookie session. A token
/// handed out in the login body stays valid until it expires; clients holding
/// one must discard it themselves.
pub async fn logout(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
) -> ApiResult<Response> {
    if let Some(Extension(user)) = auth_user {
        tracing::info!(user_id = %user.user_id, "User logged out");
    }
    let cookie = session_cookie(&state, "", 0)?;
    Ok(([(header::SET_COOKIE, cookie)], Json(serde_json::json!({ "ok": true }))).into_response())
}

/// The signed-in user, or `null`
pub async fn me(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
) -> ApiResult<Json<Option<User>>> {
    let Some(Extension(auth_user)) = auth_user else {
        return Ok(Json(None));
    };

    match state.store.get_user(auth_user.user_id).await {
        Ok(user) => Ok(Json(Some(user))),
        Err(helpdesk_shared::StoreError::NotFound(_)) => Ok(Json(None)),
        Err(err) => Err(err.into()),
    }
}
