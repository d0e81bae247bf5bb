use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for approval routing and RBAC.
///
/// Roles are opaque strings at this layer ("branch_manager", "finance",
/// "director"); the approval matrix in configuration decides which role is
/// required at which level.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison; role names arrive from external claims.
    pub fn matches(&self, other: &Role) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
