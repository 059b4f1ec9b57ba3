//! Event bus carrying bridge events to listeners.
//!
//! Dispatchers publish attribute updates and device events here; anything
//! interested in a device (automation, logging, the CLI) subscribes.

use crate::event::{BridgeEvent, EventMetadata};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Event bus for bridge events.
///
/// Backed by a broadcast channel. Publishing never blocks, so inbound frame
/// processing can publish from synchronous code.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(BridgeEvent, EventMetadata)>,
    name: String,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            name: "default".to_string(),
        }
    }

    /// Create a new event bus with a name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            tx: broadcast::channel(DEFAULT_CHANNEL_CAPACITY).0,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event with default metadata.
    ///
    /// Returns `true` if there was at least one subscriber.
    pub fn publish(&self, event: BridgeEvent) -> bool {
        self.publish_with_source(event, "bridge")
    }

    /// Publish an event with a custom source.
    pub fn publish_with_source(&self, event: BridgeEvent, source: impl Into<String>) -> bool {
        self.publish_with_metadata(event, EventMetadata::new(source))
    }

    /// Publish an event with custom metadata.
    pub fn publish_with_metadata(&self, event: BridgeEvent, metadata: EventMetadata) -> bool {
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to all events.
    ///
    /// If the subscriber falls behind, older events may be dropped.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Create a filtered subscription helper for common patterns.
    pub fn filter(&self) -> FilterBuilder {
        FilterBuilder {
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(BridgeEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the event bus is closed.
    pub async fn recv(&mut self) -> Option<(BridgeEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                // Missed some events, keep reading from the oldest retained one
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(BridgeEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }

    /// Drain every event currently buffered for this receiver.
    pub fn drain(&mut self) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        while let Some((event, _)) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Receiver for filtered events from the event bus.
pub struct FilteredReceiver<F>
where
    F: Fn(&BridgeEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(BridgeEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&BridgeEvent) -> bool + Send,
{
    fn new(rx: broadcast::Receiver<(BridgeEvent, EventMetadata)>, filter: F) -> Self {
        Self { rx, filter }
    }

    /// Receive the next event matching the filter.
    ///
    /// Returns `None` if the event bus is closed.
    pub async fn recv(&mut self) -> Option<(BridgeEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Option<(BridgeEvent, EventMetadata)> {
        while let Ok((event, meta)) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some((event, meta));
            }
        }
        None
    }
}

/// Builder for creating filtered subscriptions.
pub struct FilterBuilder {
    tx: broadcast::Sender<(BridgeEvent, EventMetadata)>,
}

impl FilterBuilder {
    /// Subscribe to attribute updates only.
    pub fn attribute_updates(&self) -> FilteredReceiver<fn(&BridgeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), BridgeEvent::is_attribute_update)
    }

    /// Subscribe to momentary device events only.
    pub fn device_events(&self) -> FilteredReceiver<fn(&BridgeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), BridgeEvent::is_device_event)
    }

    /// Subscribe to outbound command outcomes only.
    pub fn command_events(&self) -> FilteredReceiver<fn(&BridgeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), BridgeEvent::is_command_event)
    }

    /// Subscribe to every event from one device.
    pub fn for_device(
        &self,
        device_id: impl Into<String>,
    ) -> FilteredReceiver<impl Fn(&BridgeEvent) -> bool + Send + 'static> {
        let target = device_id.into();
        FilteredReceiver::new(self.tx.subscribe(), move |event: &BridgeEvent| {
            event.device_id() == target
        })
    }

    /// Subscribe with a custom filter function.
    pub fn custom<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&BridgeEvent) -> bool + Send + 'static,
    {
        FilteredReceiver::new(self.tx.subscribe(), filter)
    }
}

/// Shared event bus handle.
pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeValue;

    fn update(device_id: &str) -> BridgeEvent {
        BridgeEvent::AttributeUpdated {
            device_id: device_id.to_string(),
            endpoint: 1,
            cluster: "thermostat".to_string(),
            attribute_id: 0x0000,
            attribute: "local_temperature".to_string(),
            value: AttributeValue::Integer(2150),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert!(bus.publish(update("trv")));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.0.type_name(), "AttributeUpdated");
        assert_eq!(received.1.source, "bridge");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(!bus.publish(update("trv")));
    }

    #[tokio::test]
    async fn test_filtered_by_device() {
        let bus = EventBus::new();
        let mut rx = bus.filter().for_device("b");

        bus.publish(update("a"));
        bus.publish(update("b"));

        let (event, _) = rx.recv().await.unwrap();
        assert_eq!(event.device_id(), "b");
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_drain_collects_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(update("a"));
        bus.publish_with_source(update("b"), "test");

        let drained = rx.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].device_id(), "a");
        assert_eq!(drained[1].device_id(), "b");
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::with_name("session");
        assert_eq!(bus.name(), "session");
        assert_eq!(bus.subscriber_count(), 0);

        let _rx1 = bus.subscribe();
        let _rx2 = bus.filter().device_events();
        assert_eq!(bus.subscriber_count(), 2);
    }
}
