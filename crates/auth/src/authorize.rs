use thiserror::Error;

use stockflow_core::BranchId;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("branch {0} is outside the principal's scope")]
    BranchNotPermitted(BranchId),

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("role '{actual}' cannot act as '{required}'")]
    RoleMismatch { required: String, actual: String },
}

/// Check a permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p.as_str() == required.as_str());

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Check that the principal may act on `branch_id`.
pub fn authorize_branch(principal: &Principal, branch_id: BranchId) -> Result<(), AuthzError> {
    if principal.has_wildcard() || principal.branch_ids.contains(&branch_id) {
        Ok(())
    } else {
        Err(AuthzError::BranchNotPermitted(branch_id))
    }
}

/// Check that the principal holds `role` (wildcard principals may act as any role).
pub fn authorize_role(principal: &Principal, role: &Role) -> Result<(), AuthzError> {
    if principal.has_wildcard() || principal.role.matches(role) {
        Ok(())
    } else {
        Err(AuthzError::RoleMismatch {
            required: role.to_string(),
            actual: principal.role.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::known;
    use stockflow_core::UserId;

    fn clerk(branch: BranchId) -> Principal {
        Principal::new(UserId::new(), "clerk")
            .with_branch(branch)
            .with_permission(known::inventory_adjust())
    }

    #[test]
    fn explicit_permission_is_granted() {
        let p = clerk(BranchId::new());
        assert!(authorize(&p, &known::inventory_adjust()).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let p = clerk(BranchId::new());
        assert_eq!(
            authorize(&p, &known::purchasing_approve()),
            Err(AuthzError::Forbidden("purchasing.approve".to_string()))
        );
    }

    #[test]
    fn branch_scope_is_enforced() {
        let home = BranchId::new();
        let other = BranchId::new();
        let p = clerk(home);
        assert!(authorize_branch(&p, home).is_ok());
        assert_eq!(authorize_branch(&p, other), Err(AuthzError::BranchNotPermitted(other)));
    }

    #[test]
    fn wildcard_grants_every_branch_and_role() {
        let p = Principal::new(UserId::new(), "admin").with_permission(Permission::new("*"));
        assert!(authorize_branch(&p, BranchId::new()).is_ok());
        assert!(authorize_role(&p, &Role::new("finance")).is_ok());
    }

    #[test]
    fn role_comparison_ignores_case() {
        let p = Principal::new(UserId::new(), "Finance");
        assert!(authorize_role(&p, &Role::new("finance")).is_ok());
        assert!(authorize_role(&p, &Role::new("director")).is_err());
    }
}
