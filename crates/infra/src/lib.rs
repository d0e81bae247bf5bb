//! Infrastructure layer: persistence, cache, config, event fan-out and the
//! procurement services built on them.
//!
//! [`Procurement`] is the entry point; the services under [`services`] are
//! usable directly by trusted callers that do their own authorization.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod event_bus;
pub mod procurement;
pub mod publisher;
pub mod services;


pub use config::{AppConfig, ProcurementConfig};
pub use error::{ProcurementError, ProcurementResult};
pub use procurement::Procurement;
pub use publisher::{DomainEvent, EnvelopeSink, EventPublisher};
