//! Helpdesk API Library
//!
//! HTTP server components for the helpdesk: ticket routes, sessions and
//! the live change feed.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod notify;
pub mod routes;
pub mod security;
pub mod state;
pub mod uploads;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
