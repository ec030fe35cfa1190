//! `trailbot-hal` – hardware seams of the follower.
//!
//! - [`drive`] – [`CommandSink`][drive::CommandSink] for velocity commands.
//! - [`greeter`] – [`Greeter`][greeter::Greeter] for the spoken greeting.
//! - [`display`] – [`MarkerSink`][display::MarkerSink] for diagnostic markers.
//! - [`motion`] – [`MotionPrimitive`][motion::MotionPrimitive]: odometry-driven
//!   distance and rotation moves.
//! - [`sim`] – simulated drivers for tests and the demo binary.

pub mod display;
pub mod drive;
pub mod greeter;
pub mod motion;
pub mod sim;
