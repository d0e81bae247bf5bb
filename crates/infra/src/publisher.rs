//! Post-commit event publication.
//!
//! Services collect events while a transaction is open and hand them to the
//! [`EventPublisher`] only after commit. Publication is best-effort: failures
//! are logged and never reach the caller.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use stockflow_events::{Event, EventBus, EventEnvelope};
use stockflow_inventory::InventoryEvent;
use stockflow_purchasing::PurchasingEvent;

/// Object-safe view of a JSON envelope bus.
pub trait EnvelopeSink: Send + Sync {
    fn send(&self, envelope: EventEnvelope<JsonValue>) -> Result<(), String>;
}

impl<B> EnvelopeSink for B
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn send(&self, envelope: EventEnvelope<JsonValue>) -> Result<(), String> {
        self.publish(envelope).map_err(|e| format!("{e:?}"))
    }
}

/// Any event produced by the services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Inventory(InventoryEvent),
    Purchasing(PurchasingEvent),
}

impl From<InventoryEvent> for DomainEvent {
    fn from(e: InventoryEvent) -> Self {
        Self::Inventory(e)
    }
}

impl From<PurchasingEvent> for DomainEvent {
    fn from(e: PurchasingEvent) -> Self {
        Self::Purchasing(e)
    }
}

impl DomainEvent {
    fn to_envelope(&self) -> Result<EventEnvelope<JsonValue>, serde_json::Error> {
        match self {
            DomainEvent::Inventory(e) => EventEnvelope::from_typed(e),
            DomainEvent::Purchasing(e) => EventEnvelope::from_typed(e),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::Inventory(e) => e.event_type(),
            DomainEvent::Purchasing(e) => e.event_type(),
        }
    }
}

#[derive(Clone)]
pub struct EventPublisher {
    sink: Arc<dyn EnvelopeSink>,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn EnvelopeSink>) -> Self {
        Self { sink }
    }

    /// Publish committed events in order. Never fails.
    pub fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            let envelope = match event.to_envelope() {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(event_type = event.event_type(), error = %err, "event serialization failed");
                    continue;
                }
            };
            let event_id = envelope.event_id();
            match self.sink.send(envelope) {
                Ok(()) => debug!(event_type = event.event_type(), %event_id, "event published"),
                Err(err) => warn!(event_type = event.event_type(), %event_id, error = %err, "event publish failed"),
            }
        }
    }
}
