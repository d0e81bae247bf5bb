use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "inventory.adjust").
/// The wildcard permission `"*"` grants everything, including access to every branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: &'static str = "*";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == Self::WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permissions checked by the procurement facade.
pub mod known {
    use super::Permission;

    pub fn inventory_read() -> Permission {
        Permission::new("inventory.read")
    }

    pub fn inventory_adjust() -> Permission {
        Permission::new("inventory.adjust")
    }

    pub fn inventory_reserve() -> Permission {
        Permission::new("inventory.reserve")
    }

    /// Provision and deactivate ledger records.
    pub fn inventory_manage() -> Permission {
        Permission::new("inventory.manage")
    }

    pub fn purchasing_read() -> Permission {
        Permission::new("purchasing.read")
    }

    pub fn purchasing_create() -> Permission {
        Permission::new("purchasing.create")
    }

    pub fn purchasing_approve() -> Permission {
        Permission::new("purchasing.approve")
    }

    pub fn purchasing_send() -> Permission {
        Permission::new("purchasing.send")
    }

    pub fn purchasing_receive() -> Permission {
        Permission::new("purchasing.receive")
    }

    pub fn suppliers_read() -> Permission {
        Permission::new("suppliers.read")
    }

    pub fn suppliers_manage() -> Permission {
        Permission::new("suppliers.manage")
    }
}
