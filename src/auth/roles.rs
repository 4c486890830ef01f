//! Role Hierarchy
//! Mission: Compare privilege by level and gate owner-scoped mutations

use crate::auth::models::{Role, User};
use crate::store::{RoleStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("role {0:?} does not exist")]
    UnknownRole(String),
    #[error("role lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Looks roles up in the system of record on every call (not cached).
pub struct RoleResolver {
    roles: Arc<dyn RoleStore>,
}

impl RoleResolver {
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    async fn role_named(&self, role_name: &str) -> Result<Role, RoleError> {
        self.roles
            .get_by_name(role_name)
            .await?
            .ok_or_else(|| RoleError::UnknownRole(role_name.to_string()))
    }

    pub async fn level_of(&self, role_name: &str) -> Result<i64, RoleError> {
        Ok(self.role_named(role_name).await?.level)
    }

    /// True iff `caller` sits at or above `required_role` in the hierarchy.
    pub async fn has_precedence(&self, caller: &Role, required_role: &str) -> Result<bool, RoleError> {
        let required = self.role_named(required_role).await?;
        Ok(caller.outranks_or_equals(&required))
    }

    /// Owners always pass without a role lookup; everyone else needs the role.
    pub async fn owner_or_role(
        &self,
        caller: &User,
        owner_id: i64,
        required_role: &str,
    ) -> Result<bool, RoleError> {
        if caller.id == owner_id {
            return Ok(true);
        }

        let allowed = self.has_precedence(&caller.role, required_role).await?;
        debug!(
            user_id = caller.id,
            role = %caller.role.name,
            required_role,
            allowed,
            "Role precedence checked"
        );
        Ok(allowed)
    }
}
