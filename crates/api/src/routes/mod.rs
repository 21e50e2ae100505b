//! API routes

pub mod auth;
pub mod health;
pub mod reports;
pub mod settings;
pub mod technicians;
pub mod tickets;
pub mod users;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    auth::{optional_auth, require_auth},
    config::Config,
    error::{ApiError, ApiResult},
    notify::events_handler,
    security::security_headers_middleware,
    state::AppState,
};

/// Names, emails and categories are stored in 255-character columns
pub(crate) const MAX_FIELD_LENGTH: usize = 255;

pub(crate) fn check_length(value: &str, field: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() > max {
        return Err(ApiError::Validation(format!(
            "{field} too long (max {max} characters)"
        )));
    }
    Ok(())
}

/// Credentialed CORS for the listed origins. Without any, no CORS headers
/// are sent and browsers keep the same-origin policy.
fn cors_layer(config: &Config) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();
    if origins.is_empty() {
        return None;
    }

    let layer = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);
    Some(layer)
}

/// Create all routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public routes; a session is attached when present
    let public_api_routes = Router::new()
        .route("/tickets", get(tickets::list_tickets).post(tickets::create_ticket))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            optional_auth,
        ));

    // Protected routes (role checks inside handlers)
    let protected_api_routes = Router::new()
        // Tickets
        .route(
            "/tickets/:id",
            get(tickets::get_ticket)
                .put(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .route("/tickets/:id/comments", post(tickets::add_comment))
        // Change notifications
        .route("/events", get(events_handler))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", put(users::update_user).delete(users::delete_user))
        // Technicians
        .route(
            "/technicians",
            get(technicians::list_technicians).post(technicians::create_technician),
        )
        .route(
            "/technicians/:id",
            put(technicians::update_technician).delete(technicians::delete_technician),
        )
        // Settings & reports
        .route("/settings", get(settings::get_settings).put(settings::put_settings))
        .route("/reports", get(reports::get_reports))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    let api_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    let max_body = state.config.max_upload_bytes;
    let uploads = ServeDir::new(&state.config.upload_dir);
    let cors = cors_layer(&state.config);

    let router = Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors).with_state(state),
        None => router.with_state(state),
    }
}
