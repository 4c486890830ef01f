//! Authentication Module
//! Mission: Credential verification, identity resolution and role-based
//! authorization for every protected request

pub mod basic;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod roles;

pub use basic::basic_auth_middleware;
pub use identity::{IdentityResolver, ResolveError};
pub use jwt::{JwtHandler, TokenError};
pub use middleware::{auth_middleware, CurrentUser};
pub use password::{Password, PasswordError};
pub use roles::{RoleError, RoleResolver};
