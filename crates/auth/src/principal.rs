use serde::{Deserialize, Serialize};

use stockflow_core::{BranchId, UserId};

use crate::{Permission, Role};

/// An authenticated principal, as resolved by the auth collaborator.
///
/// The core never authenticates; it only consumes these claims for branch
/// scoping and permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub branch_ids: Vec<BranchId>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(user_id: UserId, role: impl Into<Role>) -> Self {
        Self {
            user_id,
            role: role.into(),
            branch_ids: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_branch(mut self, branch_id: BranchId) -> Self {
        self.branch_ids.push(branch_id);
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn has_wildcard(&self) -> bool {
        self.permissions.iter().any(Permission::is_wildcard)
    }
}
