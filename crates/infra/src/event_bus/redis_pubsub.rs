//! Redis pub/sub-backed event bus (optional).
//!
//! Pub/sub is not durable: subscribers that are offline miss messages.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

use stockflow_events::{EventBus, EventEnvelope, Subscription};

/// Channel the services publish on unless configured otherwise.
pub const DEFAULT_CHANNEL: &str = "stockflow.events";

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Redis pub/sub bus for JSON event envelopes.
#[derive(Debug, Clone)]
pub struct RedisPubSubEventBus {
    client: redis::Client,
    channel: String,
}

impl RedisPubSubEventBus {
    pub fn new(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }
}

impl EventBus<EventEnvelope<JsonValue>> for RedisPubSubEventBus {
    type Error = RedisBusError;

    fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&message)?;
        let mut conn = self.client.get_connection()?;
        let _: i64 = conn.publish(&self.channel, payload)?;

        Ok(())
    }

    fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        let (tx, rx) = mpsc::channel();

        let client = self.client.clone();
        let channel = self.channel.clone();

        // Background thread that receives pub/sub messages and forwards them.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(err) => {
                    warn!(error = %err, "redis subscription could not connect");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(err) = pubsub.subscribe(&channel) {
                warn!(%channel, error = %err, "redis subscribe failed");
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(_) => return,
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let envelope: EventEnvelope<JsonValue> = match serde_json::from_str(&payload) {
                    Ok(e) => e,
                    Err(err) => {
                        warn!(error = %err, "skipping undecodable event payload");
                        continue;
                    }
                };

                if tx.send(envelope).is_err() {
                    return;
                }
            }
        });

        Subscription::new(rx)
    }
}


