//! Session authentication middleware
//!
//! A session token is accepted from, in order: the `helpdesk_session`
//! cookie, an `Authorization: Bearer` header, or a `token` query parameter
//! (EventSource cannot set headers).

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use helpdesk_shared::UserRole;
use serde::Deserialize;
use uuid::Uuid;

use super::jwt::{Claims, JwtManager};
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "helpdesk_session";

/// State needed by the auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

/// Identity of the signed-in caller, inserted as a request extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    /// Forbidden unless the caller holds one of `roles`
    pub fn require_role(&self, roles: &[UserRole]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                role = %self.role,
                "Role check failed"
            );
            Err(ApiError::Forbidden)
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require_role(&[UserRole::Admin, UserRole::Superadmin])
    }

    pub fn require_superadmin(&self) -> Result<(), ApiError> {
        self.require_role(&[UserRole::Superadmin])
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Find a session token on the request, if any
pub fn extract_token(request: &Request<Body>) -> Option<String> {
    cookie_token(request.headers())
        .or_else(|| bearer_token(request.headers()))
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(request.uri())
                .ok()
                .and_then(|Query(q)| q.token)
                .filter(|token| !token.is_empty())
        })
}

fn authenticate(auth: &AuthState, request: &Request<Body>) -> Option<AuthUser> {
    let token = extract_token(request)?;
    match auth.jwt_manager.validate_token(&token) {
        Ok(claims) => Some(claims.into()),
        Err(e) => {
            tracing::debug!(error = %e, "Session token rejected");
            None
        }
    }
}

/// Reject the request with 401 unless it carries a valid session
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(&auth, &request).ok_or(ApiError::Unauthorized)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Attach the caller's identity when present; never rejects
pub async fn optional_auth(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(user) = authenticate(&auth, &request) {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_token_from_cookie() {
        let req = request(
            "/api/me",
            &[("cookie", "theme=dark; helpdesk_session=abc.def; other=1")],
        );
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_token_from_bearer_header() {
        let req = request("/api/me", &[("authorization", "Bearer xyz")]);
        assert_eq!(extract_token(&req).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_token_from_query() {
        let req = request("/api/events?token=qqq", &[]);
        assert_eq!(extract_token(&req).as_deref(), Some("qqq"));
    }

    #[test]
    fn test_cookie_wins_over_header() {
        let req = request(
            "/api/me?token=q",
            &[("cookie", "helpdesk_session=c"), ("authorization", "Bearer h")],
        );
        assert_eq!(extract_token(&req).as_deref(), Some("c"));
    }

    #[test]
    fn test_no_token() {
        let req = request("/api/me", &[("cookie", "helpdesk_session=")]);
        assert_eq!(extract_token(&req), None);
    }

    #[test]
    fn test_role_checks() {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            name: "Bruno".into(),
            email: "bruno@example.com".into(),
            role: UserRole::Technician,
        };
        assert!(user.require_admin().is_err());
        assert!(user.require_superadmin().is_err());
        assert!(user
            .require_role(&[UserRole::Technician, UserRole::Admin])
            .is_ok());
    }
}
