//! Publish channel.
//!
//! The node emits plain-text messages through the `Publisher` trait. The
//! production transport is MQTT (`MqttPublisher`); `MemoryPublisher` keeps
//! messages in process for dry runs and tests.

mod endpoint;
mod memory;
mod mqtt;

pub use endpoint::{parse_mqtt_endpoint, MqttEndpoint};
pub use memory::{MemoryPublisher, MemoryTopic};
pub use mqtt::MqttPublisher;

use anyhow::Result;

/// A named, best-effort broadcast channel carrying text messages.
pub trait Publisher {
    /// Topic this publisher writes to.
    fn topic(&self) -> &str;

    /// Emit one message. Delivery to subscribers is not guaranteed.
    ///
    /// An error means the channel itself is unusable (not a dropped message).
    fn publish(&mut self, payload: &str) -> Result<()>;

    /// Release the channel. Calls after the first do nothing.
    fn close(&mut self);
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn topic(&self) -> &str {
        (**self).topic()
    }

    fn publish(&mut self, payload: &str) -> Result<()> {
        (**self).publish(payload)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
