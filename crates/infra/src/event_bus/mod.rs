//! Infrastructure-backed event buses.
//!
//! The bus abstraction lives in `stockflow-events`; the in-process bus covers
//! tests and single-node deployments. Redis pub/sub fans events out to other
//! processes when the `redis` feature is enabled.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};
