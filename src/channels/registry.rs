//! Capability table: channel → {quota limits, send capability}.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::channels::{Channel, ChannelLimits, OutreachSender};

/// Everything the dispatcher needs to know about one channel.
#[derive(Clone)]
pub struct Capability {
    pub limits: ChannelLimits,
    pub sender: Arc<dyn OutreachSender>,
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("limits", &self.limits)
            .field("sender", &self.sender.name())
            .finish()
    }
}

/// Static per-channel configuration, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: BTreeMap<Channel, Capability>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the capability for a channel.
    pub fn register(
        &mut self,
        channel: Channel,
        limits: ChannelLimits,
        sender: Arc<dyn OutreachSender>,
    ) -> &mut Self {
        tracing::debug!(
            channel = %channel,
            hourly = limits.hourly,
            daily = limits.daily,
            sender = sender.name(),
            "Registered channel capability"
        );
        self.entries.insert(channel, Capability { limits, sender });
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&Capability> {
        self.entries.get(&channel)
    }

    pub fn sender(&self, channel: Channel) -> Option<Arc<dyn OutreachSender>> {
        self.entries.get(&channel).map(|c| Arc::clone(&c.sender))
    }

    /// Channels with a send capability, in enum order.
    pub fn channels(&self) -> Vec<Channel> {
        self.entries.keys().copied().collect()
    }

    /// `(channel, limits)` pairs, in enum order.
    pub fn limits(&self) -> Vec<(Channel, ChannelLimits)> {
        self.entries
            .iter()
            .map(|(channel, cap)| (*channel, cap.limits))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::channels::OutreachMessage;
    use crate::error::ChannelError;

    struct NullSender;

    #[async_trait]
    impl OutreachSender for NullSender {
        fn name(&self) -> &str {
            "null"
        }

        async fn send(&self, _target: &str, _message: &OutreachMessage) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut table = CapabilityTable::new();
        table
            .register(Channel::Twitter, ChannelLimits::new(5, 20), Arc::new(NullSender))
            .register(Channel::Email, ChannelLimits::new(10, 100), Arc::new(NullSender));

        assert_eq!(table.len(), 2);
        assert_eq!(table.channels(), vec![Channel::Email, Channel::Twitter]);
        assert_eq!(table.get(Channel::Email).unwrap().limits.daily, 100);
        assert!(table.get(Channel::Reddit).is_none());
        assert!(table.sender(Channel::Twitter).is_some());
    }

    #[test]
    fn register_replaces_existing_entry() {
        let mut table = CapabilityTable::new();
        table.register(Channel::Email, ChannelLimits::new(1, 1), Arc::new(NullSender));
        table.register(Channel::Email, ChannelLimits::new(2, 3), Arc::new(NullSender));
        assert_eq!(table.len(), 1);
        assert_eq!(table.limits(), vec![(Channel::Email, ChannelLimits::new(2, 3))]);
    }
}
