//! Single-publisher, multi-subscriber topic

use super::{BusError, ResourceMeta};
use crate::msg::ChannelId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Receiving end handed to a subscriber; read with `try_recv` from a tick
pub type SubscriberReceiver = mpsc::UnboundedReceiver<Bytes>;

struct Subscriber {
    meta: ResourceMeta,
    sender: mpsc::UnboundedSender<Bytes>,
}

/// Channel descriptor plus its subscriber list, as reported over RPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: ChannelId,
    pub publisher: ResourceMeta,
    pub subscribers: Vec<ResourceMeta>,
}

/// One publisher, any number of subscribers
///
/// Each subscriber owns an unbounded queue that buffers messages until it
/// drains them. Messages are only queued for subscribers attached at publish
/// time; there is no replay.
pub struct PubsubChannel {
    id: ChannelId,
    publisher: ResourceMeta,
    subscribers: Vec<Subscriber>,
}

impl PubsubChannel {
    pub fn new(id: ChannelId, publisher: ResourceMeta) -> Self {
        Self {
            id,
            publisher,
            subscribers: Vec::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn publisher(&self) -> ResourceMeta {
        self.publisher
    }

    /// Attach a subscriber and return its queue
    ///
    /// Subscribing again with the same descriptor replaces the old queue.
    pub fn subscribe(&mut self, meta: ResourceMeta) -> SubscriberReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Some(existing) = self.subscribers.iter_mut().find(|s| s.meta == meta) {
            existing.sender = sender;
        } else {
            self.subscribers.push(Subscriber { meta, sender });
        }
        receiver
    }

    /// Detach a subscriber, returning whether it was attached
    pub fn unsubscribe(&mut self, meta: &ResourceMeta) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| &s.meta != meta);
        self.subscribers.len() != before
    }

    pub fn is_subscribed(&self, meta: &ResourceMeta) -> bool {
        self.subscribers.iter().any(|s| &s.meta == meta)
    }

    pub fn subscribers(&self) -> Vec<ResourceMeta> {
        self.subscribers.iter().map(|s| s.meta).collect()
    }

    /// Queue `message` for every subscriber, in subscription order
    ///
    /// Returns the subscribers it was delivered to. Subscribers whose receiver
    /// has been dropped are detached.
    pub fn publish(
        &mut self,
        from: &ResourceMeta,
        message: impl Into<Bytes>,
    ) -> Result<Vec<ResourceMeta>, BusError> {
        if from != &self.publisher {
            return Err(BusError::NotPublisher {
                channel: self.id,
                resource: *from,
            });
        }

        let message = message.into();
        let mut delivered = Vec::with_capacity(self.subscribers.len());
        let channel = self.id;

        self.subscribers.retain(|s| match s.sender.send(message.clone()) {
            Ok(()) => {
                delivered.push(s.meta);
                true
            }
            Err(_) => {
                tracing::debug!("Dropping closed subscriber {} from channel {}", s.meta, channel);
                false
            }
        });

        Ok(delivered)
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            channel_id: self.id,
            publisher: self.publisher,
            subscribers: self.subscribers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbus::ResourceType;

    fn terminal(id: u32) -> ResourceMeta {
        ResourceMeta::new(id, ResourceType::Terminal)
    }

    fn process(id: u32) -> ResourceMeta {
        ResourceMeta::new(id, ResourceType::Process)
    }

    #[test]
    fn test_only_publisher_may_post() {
        let mut channel = PubsubChannel::new(ChannelId(1), terminal(1));
        let err = channel.publish(&terminal(2), Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, BusError::NotPublisher { .. }));
    }

    #[test]
    fn test_resubscribe_keeps_single_entry() {
        let mut channel = PubsubChannel::new(ChannelId(1), terminal(1));
        let _old = channel.subscribe(process(5));
        let mut new = channel.subscribe(process(5));
        assert_eq!(channel.subscribers(), vec![process(5)]);

        channel.publish(&terminal(1), Bytes::from_static(b"hi")).unwrap();
        assert_eq!(new.try_recv().unwrap(), Bytes::from_static(b"hi"));
    }

    #[test]
    fn test_dropped_subscriber_is_detached_on_publish() {
        let mut channel = PubsubChannel::new(ChannelId(1), terminal(1));
        let gone = channel.subscribe(process(2));
        let _kept = channel.subscribe(process(3));
        drop(gone);

        let delivered = channel.publish(&terminal(1), Bytes::from_static(b"x")).unwrap();
        assert_eq!(delivered, vec![process(3)]);
        assert!(!channel.is_subscribed(&process(2)));
    }

    #[test]
    fn test_unsubscribe() {
        let mut channel = PubsubChannel::new(ChannelId(1), terminal(1));
        let _rx = channel.subscribe(process(2));
        assert!(channel.unsubscribe(&process(2)));
        assert!(!channel.unsubscribe(&process(2)));
        assert!(channel.subscribers().is_empty());
    }
}
