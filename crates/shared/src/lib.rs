//! Helpdesk shared types and storage
//!
//! Domain types, the [`HelpdeskStore`] trait and its Postgres and in-memory
//! backends, shared by the API server and its tools.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{HelpdeskStore, MemoryStore, PgStore};
pub use types::*;
