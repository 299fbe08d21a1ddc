//! Identity verification for chat callers

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{optional_auth, require_admin, AuthUser};
