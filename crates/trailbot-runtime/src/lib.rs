//! `trailbot-runtime` – behavior arbitration and the control loop.
//!
//! # Modules
//!
//! - [`controller`] – the [`BehaviorController`][controller::BehaviorController]
//!   seam and [`Decision`][controller::Decision].
//! - [`blended`] – continuous proportional law, one command per depth frame.
//! - [`state_machine`] – SEARCH / AVOID / APPROACH / ENGAGE machine evaluated
//!   at a fixed rate.
//! - [`dwell`] – [`DwellTracker`][dwell::DwellTracker]: entry detection for
//!   one-shot side effects.
//! - [`markers`] – target and search-box diagnostic markers.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the single
//!   task that owns all follower state, and its
//!   [`ControlHandle`][control_loop::ControlHandle].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing] with optional
//!   OTLP span export.

pub mod blended;
pub mod control_loop;
pub mod controller;
pub mod dwell;
pub mod markers;
pub mod state_machine;
pub mod telemetry;

pub use control_loop::{ControlHandle, ControlLoop, LoopMessage, LoopStatus, Outputs};
pub use controller::{BehaviorController, Decision, Trigger, controller_for};
pub use telemetry::{TelemetryGuard, init_tracing};
