//! The adapter seam between the follower and the outside world.
//!
//! The follower never speaks a transport protocol directly.  It publishes to
//! its internal [`EventBus`][crate::bus::EventBus]; an adapter listens there,
//! forwards commands to the base, and turns inbound sensor traffic into
//! [`SensorEvent`]s.
//!
//! - [`FollowerAdapter`] – the trait every adapter implements.
//! - [`SimSceneAdapter`][crate::sim_adapter::SimSceneAdapter] – a simulated
//!   robot following a simulated person.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use trailbot_types::{FollowError, SensorEvent, VelocityCommand};

/// # Contract
///
/// * `execute_command` – deliver one velocity command to the base.  Must not
///   wait for the base to act on it.
/// * `sensor_stream` – a live stream of depth frames and detector outputs.
///   The streams are independent and unsynchronized.
#[async_trait]
pub trait FollowerAdapter: Send + Sync {
    async fn execute_command(&self, cmd: VelocityCommand) -> Result<(), FollowError>;

    async fn sensor_stream(&self) -> BoxStream<'static, SensorEvent>;
}
