//! Domain event mechanics: event trait, envelope, pub/sub bus.
//!
//! Concrete event enums live with their domain crates (`stockflow-inventory`,
//! `stockflow-purchasing`); this crate only knows how to wrap and distribute them.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
