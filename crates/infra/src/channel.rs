//! External message channel boundary.
//!
//! The channel is an opaque collaborator: `publish` either succeeds or fails
//! for this cycle. The publisher retries pending events on later cycles, so
//! implementations do not need their own retry logic. Downstream consumers
//! must be idempotent (at-least-once delivery).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Publish failure.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel could not accept the message (transient by assumption).
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// Opaque external message channel.
pub trait EventChannel: Send + Sync {
    fn publish(&self, message: &str) -> Result<(), ChannelError>;
}

impl<C> EventChannel for Arc<C>
where
    C: EventChannel + ?Sized,
{
    fn publish(&self, message: &str) -> Result<(), ChannelError> {
        (**self).publish(message)
    }
}

/// In-memory channel for tests/dev.
///
/// Records published messages in order and can simulate an outage via
/// [`InMemoryChannel::set_failing`].
#[derive(Debug, Default)]
pub struct InMemoryChannel {
    messages: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Toggle outage simulation: while `true`, every publish fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages published so far, in publish order.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl EventChannel for InMemoryChannel {
    fn publish(&self, message: &str) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable("simulated outage".to_string()));
        }
        self.messages
            .lock()
            .map_err(|_| ChannelError::Unavailable("lock poisoned".to_string()))?
            .push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_messages_in_order() {
        let channel = InMemoryChannel::new();
        channel.publish("a").unwrap();
        channel.publish("b").unwrap();
        assert_eq!(channel.messages(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn outage_fails_publishes_until_cleared() {
        let channel = InMemoryChannel::new();
        channel.set_failing(true);
        assert!(channel.publish("a").is_err());
        channel.set_failing(false);
        channel.publish("a").unwrap();
        assert_eq!(channel.messages().len(), 1);
    }
}
