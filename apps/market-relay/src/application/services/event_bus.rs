//! Local Event Bus
//!
//! Named-channel publish/subscribe over tokio broadcast channels.
//!
//! # Semantics
//!
//! - Channels are created on first subscription.
//! - `publish` is synchronous and never blocks. Receivers created after a
//!   publication never see it.
//! - A firehose receiver (`subscribe_all`) sees every publication on every
//!   channel.
//! - Slow receivers lag and lose the oldest events (broadcast semantics).

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Typed publish/subscribe keyed by channel name.
#[derive(Debug)]
pub struct EventBus<T: Clone> {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<T>>>,
    firehose: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    /// Create a bus whose channels buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            channels: RwLock::new(HashMap::new()),
            firehose: broadcast::channel(capacity).0,
        }
    }

    /// Publish `event` on `channel` and the firehose.
    ///
    /// Returns how many receivers the event reached.
    pub fn publish(&self, channel: &str, event: T) -> usize {
        let on_channel = self
            .channels
            .read()
            .get(channel)
            .and_then(|tx| tx.send(event.clone()).ok())
            .unwrap_or(0);

        let on_firehose = self.firehose.send(event).unwrap_or(0);

        on_channel + on_firehose
    }

    /// Receive future events published on `channel`.
    #[must_use]
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<T> {
        if let Some(tx) = self.channels.read().get(channel) {
            return tx.subscribe();
        }

        self.channels
            .write()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Receive every future event regardless of channel.
    #[must_use]
    pub fn subscribe_all(&self) -> broadcast::Receiver<T> {
        self.firehose.subscribe()
    }

    /// Live receivers on `channel`.
    #[must_use]
    pub fn receiver_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Receiver counts across the bus.
    #[must_use]
    pub fn stats(&self) -> EventBusStats {
        let channels = self.channels.read();
        EventBusStats {
            channels: channels.len(),
            channel_receivers: channels.values().map(broadcast::Sender::receiver_count).sum(),
            firehose_receivers: self.firehose.receiver_count(),
        }
    }
}

/// Statistics about an event bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventBusStats {
    /// Channels created so far.
    pub channels: usize,
    /// Receivers across named channels.
    pub channel_receivers: usize,
    /// Firehose receivers.
    pub firehose_receivers: usize,
}

impl EventBusStats {
    /// Total number of receivers.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.channel_receivers + self.firehose_receivers
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    #[test]
    fn publish_without_receivers_reaches_nobody() {
        let bus: EventBus<u32> = EventBus::new(16);
        assert_eq!(bus.publish("ticker", 1), 0);
        assert_eq!(bus.stats().channels, 0);
    }

    #[tokio::test]
    async fn channel_receivers_only_see_their_channel() {
        let bus: EventBus<&'static str> = EventBus::new(16);
        let mut tickers = bus.subscribe("ticker");
        let mut trades = bus.subscribe("trade");

        assert_eq!(bus.publish("ticker", "t1"), 1);

        assert_eq!(tickers.recv().await.unwrap(), "t1");
        assert_eq!(trades.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let bus: EventBus<u32> = EventBus::new(16);
        let _early = bus.subscribe("ticker");
        bus.publish("ticker", 1);

        let mut late = bus.subscribe("ticker");
        assert_eq!(late.try_recv(), Err(TryRecvError::Empty));

        bus.publish("ticker", 2);
        assert_eq!(late.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn firehose_sees_every_channel_in_order() {
        let bus: EventBus<u32> = EventBus::new(16);
        let mut all = bus.subscribe_all();

        bus.publish("ticker", 1);
        bus.publish("trade", 2);
        bus.publish("kline", 3);

        assert_eq!(all.recv().await.unwrap(), 1);
        assert_eq!(all.recv().await.unwrap(), 2);
        assert_eq!(all.recv().await.unwrap(), 3);
    }

    #[test]
    fn receiver_counts_track_drops() {
        let bus: EventBus<u32> = EventBus::new(0);
        {
            let _a = bus.subscribe("ticker");
            let _b = bus.subscribe("ticker");
            let _all = bus.subscribe_all();
            assert_eq!(bus.receiver_count("ticker"), 2);
            assert_eq!(bus.stats().total_receivers(), 3);
        }

        assert_eq!(bus.receiver_count("ticker"), 0);
        assert_eq!(bus.receiver_count("unknown"), 0);
        assert_eq!(bus.stats().channels, 1);
    }
}
