//! Channel bus - named pub/sub channels plus a flat list of tracked resources
//!
//! The substrate terminals and worker processes attach to when something has to
//! cross a process boundary. The bus is owned by the hypervisor; nothing here is
//! global.

mod pubsub;

pub use pubsub::{ChannelInfo, PubsubChannel, SubscriberReceiver};

use crate::msg::{ChannelId, ResourceId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Kind of a tracked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Terminal,
    Process,
    PubsubChannel,
}

/// Descriptor of any resource the bus knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub id: ResourceId,
    pub kind: ResourceType,
}

impl ResourceMeta {
    pub fn new(id: impl Into<ResourceId>, kind: ResourceType) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

impl fmt::Display for ResourceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.id)
    }
}

/// Bus errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("Channel {0} not found")]
    ChannelNotFound(ChannelId),

    #[error("{resource} is not the publisher of channel {channel}")]
    NotPublisher {
        channel: ChannelId,
        resource: ResourceMeta,
    },

    #[error("{resource} is not subscribed to channel {channel}")]
    NotSubscribed {
        channel: ChannelId,
        resource: ResourceMeta,
    },
}

/// Pub/sub channels by id and the resource list
#[derive(Default)]
pub struct ChannelBus {
    channels: HashMap<ChannelId, PubsubChannel>,
    resources: Vec<ResourceMeta>,
    next_channel_id: u32,
}

impl ChannelBus {
    /// An empty bus; owning it is what scopes its lifetime
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a resource exists
    ///
    /// Duplicates are kept: registering the same descriptor twice yields two entries.
    pub fn register_resource(&mut self, id: impl Into<ResourceId>, kind: ResourceType) {
        let meta = ResourceMeta::new(id, kind);
        tracing::debug!("Registering resource {}", meta);
        self.resources.push(meta);
    }

    /// Remove the first entry matching both id and kind
    ///
    /// Returns whether an entry was removed; absent descriptors are ignored.
    pub fn unregister_resource(&mut self, id: impl Into<ResourceId>, kind: ResourceType) -> bool {
        let meta = ResourceMeta::new(id, kind);
        match self.resources.iter().position(|r| *r == meta) {
            Some(index) => {
                self.resources.remove(index);
                tracing::debug!("Unregistered resource {}", meta);
                true
            }
            None => false,
        }
    }

    pub fn resources(&self) -> &[ResourceMeta] {
        &self.resources
    }

    /// Create a channel owned by `publisher` and register it as a resource
    pub fn create_channel(&mut self, publisher: ResourceMeta) -> ChannelId {
        self.next_channel_id += 1;
        let id = ChannelId(self.next_channel_id);

        self.channels.insert(id, PubsubChannel::new(id, publisher));
        self.register_resource(id, ResourceType::PubsubChannel);
        tracing::info!("Created channel {} published by {}", id, publisher);

        id
    }

    /// Tear a channel down explicitly and drop its resource entry
    pub fn remove_channel(&mut self, id: ChannelId) -> Option<PubsubChannel> {
        let removed = self.channels.remove(&id)?;
        self.unregister_resource(id, ResourceType::PubsubChannel);
        tracing::info!("Removed channel {}", id);
        Some(removed)
    }

    pub fn channel(&self, id: ChannelId) -> Result<&PubsubChannel, BusError> {
        self.channels.get(&id).ok_or(BusError::ChannelNotFound(id))
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Result<&mut PubsubChannel, BusError> {
        self.channels
            .get_mut(&id)
            .ok_or(BusError::ChannelNotFound(id))
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<_> = self.channels.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn subscribe(
        &mut self,
        channel: ChannelId,
        subscriber: ResourceMeta,
    ) -> Result<SubscriberReceiver, BusError> {
        let rx = self.channel_mut(channel)?.subscribe(subscriber);
        tracing::debug!("{} subscribed to channel {}", subscriber, channel);
        Ok(rx)
    }

    pub fn unsubscribe(
        &mut self,
        channel: ChannelId,
        subscriber: &ResourceMeta,
    ) -> Result<(), BusError> {
        if !self.channel_mut(channel)?.unsubscribe(subscriber) {
            return Err(BusError::NotSubscribed {
                channel,
                resource: *subscriber,
            });
        }
        tracing::debug!("{} unsubscribed from channel {}", subscriber, channel);
        Ok(())
    }

    /// Unsubscribe a resource from every channel it is attached to
    pub fn unsubscribe_everywhere(&mut self, subscriber: &ResourceMeta) {
        for channel in self.channels.values_mut() {
            channel.unsubscribe(subscriber);
        }
    }

    pub fn publish(
        &mut self,
        channel: ChannelId,
        from: &ResourceMeta,
        message: impl Into<Bytes>,
    ) -> Result<Vec<ResourceMeta>, BusError> {
        self.channel_mut(channel)?.publish(from, message)
    }

    pub fn channel_info(&self, id: ChannelId) -> Result<ChannelInfo, BusError> {
        Ok(self.channel(id)?.info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{TaskId, TerminalId};

    #[test]
    fn test_new_bus_is_empty() {
        let bus = ChannelBus::new();
        assert!(bus.resources().is_empty());
        assert!(bus.channel_ids().is_empty());
    }

    #[test]
    fn test_channel_ids_are_unique() {
        let mut bus = ChannelBus::new();
        let publisher = ResourceMeta::new(TerminalId(1), ResourceType::Terminal);
        let a = bus.create_channel(publisher);
        let b = bus.create_channel(publisher);
        assert_ne!(a, b);
        assert_eq!(bus.channel_ids(), vec![a, b]);
    }

    #[test]
    fn test_create_channel_registers_resource() {
        let mut bus = ChannelBus::new();
        let id = bus.create_channel(ResourceMeta::new(TerminalId(1), ResourceType::Terminal));
        assert_eq!(
            bus.resources(),
            &[ResourceMeta::new(id, ResourceType::PubsubChannel)]
        );
    }

    #[test]
    fn test_unknown_channel_is_an_error() {
        let mut bus = ChannelBus::new();
        let meta = ResourceMeta::new(TaskId(3), ResourceType::Process);
        assert_eq!(
            bus.subscribe(ChannelId(99), meta).unwrap_err(),
            BusError::ChannelNotFound(ChannelId(99))
        );
        assert!(bus.channel_info(ChannelId(99)).is_err());
    }

    #[test]
    fn test_unsubscribe_twice_is_an_error() {
        let mut bus = ChannelBus::new();
        let id = bus.create_channel(ResourceMeta::new(TerminalId(1), ResourceType::Terminal));
        let meta = ResourceMeta::new(TaskId(2), ResourceType::Process);
        let _rx = bus.subscribe(id, meta).unwrap();

        assert!(bus.unsubscribe(id, &meta).is_ok());
        assert_eq!(
            bus.unsubscribe(id, &meta).unwrap_err(),
            BusError::NotSubscribed {
                channel: id,
                resource: meta
            }
        );
    }

    #[test]
    fn test_remove_channel_drops_resource_entry() {
        let mut bus = ChannelBus::new();
        let id = bus.create_channel(ResourceMeta::new(TerminalId(1), ResourceType::Terminal));
        assert!(bus.remove_channel(id).is_some());
        assert!(bus.resources().is_empty());
        assert!(bus.remove_channel(id).is_none());
    }
}
