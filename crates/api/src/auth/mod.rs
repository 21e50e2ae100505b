//! Authentication and sessions

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{optional_auth, require_auth, AuthState, AuthUser, SESSION_COOKIE};
pub use password::{hash_password, validate_password, verify_password, PasswordError};
