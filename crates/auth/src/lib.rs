//! `stockflow-auth`: authorization boundary over claims issued elsewhere.
//!
//! This crate is intentionally decoupled from transport and storage.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize, authorize_branch, authorize_role};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
