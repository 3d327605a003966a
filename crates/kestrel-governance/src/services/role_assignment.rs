//! Role-change validation.
//!
//! Guards role assignments against privilege escalation and self-demotion.
//! The validator is stateless and knows nothing about requests or grants;
//! the user-management collaborator invokes it independently before
//! persisting a role change.

use crate::error::{GovernanceError, Result};
use crate::types::{Actor, Role, User};

/// Validates role-change operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAssignmentValidator;

impl RoleAssignmentValidator {
    /// Create a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check that `actor` may assign `new_role` to `target`.
    ///
    /// Rules, in order: the actor must strictly outrank the role being
    /// granted, and actors may never lower their own privilege through
    /// this path.
    pub fn validate(&self, actor: &Actor, target: &User, new_role: Role) -> Result<()> {
        if !actor.role.outranks(new_role) {
            tracing::warn!(
                actor_id = %actor.user_id,
                actor_role = %actor.role,
                %new_role,
                "role assignment refused: actor does not outrank new role"
            );
            return Err(GovernanceError::InsufficientPrivilege {
                required: new_role,
                actual: actor.role,
            });
        }
        // Past the rank guard, new_role is strictly below the actor's own.
        if actor.user_id == target.id {
            return Err(GovernanceError::SelfDemotion);
        }
        Ok(())
    }
}
