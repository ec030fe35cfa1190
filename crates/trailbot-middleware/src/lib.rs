//! `trailbot-middleware` – routes follower output to the outside world.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe bus on Tokio broadcast channels.
//! - [`sinks`] – bus-backed command, greeting and marker sinks.
//! - [`adapter`] – the [`FollowerAdapter`][adapter::FollowerAdapter] seam a
//!   transport implements.
//! - [`sim_adapter`] – a simulated robot following a simulated person.

pub mod adapter;
pub mod bus;
pub mod sim_adapter;
pub mod sinks;

pub use adapter::FollowerAdapter;
pub use bus::{EventBus, Topic, TopicReceiver};
pub use sim_adapter::{SceneConfig, SimSceneAdapter};
pub use sinks::{BusCommandSink, BusGreeter, BusMarkerSink};
