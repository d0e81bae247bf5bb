//! `stockflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::{Entity, lock_order};
pub use error::{DomainError, DomainResult};
pub use id::{BranchId, ProductId, SupplierId, UserId, parse_id};
pub use value_object::ValueObject;
