//! Bus-backed implementations of the HAL output seams.
//!
//! The control loop only knows [`CommandSink`], [`Greeter`] and
//! [`MarkerSink`].  These implementations turn each call into a
//! [`BusEvent`] on the matching [`Topic`], where adapters pick it up.

use trailbot_hal::display::MarkerSink;
use trailbot_hal::drive::CommandSink;
use trailbot_hal::greeter::Greeter;
use trailbot_types::{BusEvent, BusPayload, FollowError, Marker, VelocityCommand};

use crate::bus::{EventBus, Topic};

const SOURCE: &str = "trailbot-middleware::sinks";

/// Publishes every command to [`Topic::Commands`].
#[derive(Debug, Clone)]
pub struct BusCommandSink {
    bus: EventBus,
}

impl BusCommandSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl CommandSink for BusCommandSink {
    fn id(&self) -> &str {
        "bus/cmd_vel"
    }

    fn publish(&mut self, cmd: VelocityCommand) -> Result<(), FollowError> {
        let event = BusEvent::new(format!("{SOURCE}/cmd_vel"), BusPayload::Command(cmd));
        self.bus.publish_to(Topic::Commands, event);
        Ok(())
    }
}

/// Publishes greeting phrases to [`Topic::Interaction`].
#[derive(Debug, Clone)]
pub struct BusGreeter {
    bus: EventBus,
}

impl BusGreeter {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl Greeter for BusGreeter {
    fn greet(&mut self, phrase: &str) -> Result<(), FollowError> {
        let event = BusEvent::new(
            format!("{SOURCE}/greeting"),
            BusPayload::Greeting(phrase.to_string()),
        );
        self.bus.publish_to(Topic::Interaction, event);
        Ok(())
    }
}

/// Publishes marker frames to [`Topic::Diagnostics`].
#[derive(Debug, Clone)]
pub struct BusMarkerSink {
    bus: EventBus,
}

impl BusMarkerSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl MarkerSink for BusMarkerSink {
    fn publish_markers(&mut self, markers: &[Marker]) -> Result<(), FollowError> {
        // Skip the clone when nobody is watching.
        if self.bus.subscriber_count(Topic::Diagnostics) == 0 {
            return Ok(());
        }
        let event = BusEvent::new(
            format!("{SOURCE}/markers"),
            BusPayload::Markers(markers.to_vec()),
        );
        self.bus.publish_to(Topic::Diagnostics, event);
        Ok(())
    }
}
