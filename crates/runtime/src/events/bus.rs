//! Topic-based event bus implementation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::types::{DeckEvent, GuideEvent, SyncEvent};

/// Topics for event routing
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize, strum::EnumIter)]
pub enum Topic {
    /// Chain uploads, promotion and remote acknowledgments
    Sync,
    /// Guide log appends, undo and resets
    Guide,
    /// Deck edits and deletions
    Deck,
}

/// Event wrapper that carries the topic and typed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Sync(SyncEvent),
    Guide(GuideEvent),
    Deck(DeckEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Sync(_) => Topic::Sync,
            Event::Guide(_) => Topic::Guide,
            Event::Deck(_) => Topic::Deck,
        }
    }
}

impl From<SyncEvent> for Event {
    fn from(event: SyncEvent) -> Self {
        Event::Sync(event)
    }
}

impl From<GuideEvent> for Event {
    fn from(event: GuideEvent) -> Self {
        Event::Guide(event)
    }
}

impl From<DeckEvent> for Event {
    fn from(event: DeckEvent) -> Self {
        Event::Deck(event)
    }
}

/// Topic-based event bus
///
/// Channels for every topic are created up front and never change, so
/// publishing and subscribing need no locking.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<HashMap<Topic, broadcast::Sender<Event>>>,
}

impl EventBus {
    /// Creates a new event bus with default capacity for each topic
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Creates a new event bus with specified capacity per topic
    pub fn with_capacity(capacity: usize) -> Self {
        use strum::IntoEnumIterator;

        let capacity = capacity.max(1);
        let channels = Topic::iter()
            .map(|topic| (topic, broadcast::channel(capacity).0))
            .collect();

        Self {
            channels: Arc::new(channels),
        }
    }

    /// Publish an event to its corresponding topic
    pub fn publish(&self, event: impl Into<Event>) {
        let event = event.into();
        let topic = event.topic();

        if let Some(tx) = self.channels.get(&topic)
            && tx.send(event).is_err()
        {
            // No subscribers for this topic - this is normal, not an error
            tracing::trace!("No subscribers for topic {:?}", topic);
        }
    }

    /// Subscribe to a specific topic
    ///
    /// Returns a receiver that will only receive events for that topic.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        match self.channels.get(&topic) {
            Some(tx) => tx.subscribe(),
            // every topic is registered in with_capacity
            None => broadcast::channel(1).1,
        }
    }

    /// Subscribe to multiple topics
    pub fn subscribe_multiple(
        &self,
        topics: &[Topic],
    ) -> HashMap<Topic, broadcast::Receiver<Event>> {
        topics
            .iter()
            .map(|&topic| (topic, self.subscribe(topic)))
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn subscribers_only_see_their_topic() {
        let bus = EventBus::with_capacity(8);
        let mut sync_rx = bus.subscribe(Topic::Sync);
        let mut guide_rx = bus.subscribe(Topic::Guide);
        let campaign = Uuid::new_v4();

        bus.publish(GuideEvent::ScenarioReset {
            campaign,
            scenario: "the_gathering".into(),
        });

        assert!(sync_rx.try_recv().is_err());
        assert_eq!(
            guide_rx.recv().await.unwrap(),
            Event::Guide(GuideEvent::ScenarioReset {
                campaign,
                scenario: "the_gathering".into(),
            })
        );
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(SyncEvent::UploadFinished {
            campaign: Uuid::new_v4(),
            investigator: "01001".into(),
            uploaded: 0,
        });
    }
}
