//! Headless, typed, topic-based publish/subscribe bus for follower output.
//!
//! Uses [`tokio::sync::broadcast`] channels so every subscriber receives every
//! message and a slow subscriber never blocks the control loop.
//!
//! # Topics
//!
//! | Topic | Traffic |
//! |---|---|
//! | [`Topic::Commands`] | Velocity commands for the drive base |
//! | [`Topic::Diagnostics`] | Markers and state-change notices |
//! | [`Topic::Interaction`] | Greeting phrases for the speech output |
//! | [`Topic::Alerts`] | Component faults |

use tokio::sync::broadcast;
use tracing::warn;
use trailbot_types::{BusEvent, BusPayload};

/// Default channel capacity (events buffered before slow subscribers lag).
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Commands,
    Diagnostics,
    Interaction,
    Alerts,
}

impl Topic {
    /// The lane a payload is routed to by [`EventBus::publish`].
    pub fn for_payload(payload: &BusPayload) -> Self {
        match payload {
            BusPayload::Command(_) => Topic::Commands,
            BusPayload::Markers(_) | BusPayload::StateChanged(_) => Topic::Diagnostics,
            BusPayload::Greeting(_) => Topic::Interaction,
            BusPayload::Fault { .. } => Topic::Alerts,
        }
    }
}

/// Shared event bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    commands: broadcast::Sender<BusEvent>,
    diagnostics: broadcast::Sender<BusEvent>,
    interaction: broadcast::Sender<BusEvent>,
    alerts: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (commands, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        let (interaction, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            commands,
            diagnostics,
            interaction,
            alerts,
        }
    }

    /// Publish `event` to `topic`.
    ///
    /// Returns the number of receivers handed the event; `0` when nobody is
    /// listening, which is not an error.
    pub fn publish_to(&self, topic: Topic, event: BusEvent) -> usize {
        self.sender(topic).send(event).unwrap_or(0)
    }

    /// Publish `event` to the topic its payload belongs to.
    pub fn publish(&self, event: BusEvent) -> usize {
        let topic = Topic::for_payload(&event.payload);
        self.publish_to(topic, event)
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.sender(topic).subscribe(),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<BusEvent> {
        match topic {
            Topic::Commands => &self.commands,
            Topic::Diagnostics => &self.diagnostics,
            Topic::Interaction => &self.interaction,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<BusEvent>,
}

impl TopicReceiver {
    /// Wait for the next event, surfacing lag to the caller.
    pub async fn recv(&mut self) -> Result<BusEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, skipping over lag.
    ///
    /// Returns `None` once every bus handle has been dropped.
    pub async fn next(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
