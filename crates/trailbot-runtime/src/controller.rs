//! Behavior-controller seam.
//!
//! A [`BehaviorController`] turns one [`SignalSnapshot`] into a
//! [`Decision`].  Two implementations exist:
//!
//! | Controller | Evaluated on |
//! |---|---|
//! | [`BlendedController`][crate::blended::BlendedController] | every depth frame |
//! | [`StateMachineController`][crate::state_machine::StateMachineController] | a fixed-rate tick |
//!
//! Controllers never touch the hardware.  The control loop applies the
//! decision, and applies the enable gate before any controller runs.

use trailbot_perception::SignalSnapshot;
use trailbot_types::{FollowerConfig, Policy, RobotState, TargetEstimate, VelocityCommand};

use crate::blended::BlendedController;
use crate::state_machine::StateMachineController;

/// What makes the control loop evaluate a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DepthFrame,
    Tick,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Decision {
    /// `None` leaves the last command in place.
    pub command: Option<VelocityCommand>,
    /// Fire the greeting side effect.
    pub greet: bool,
    /// Discrete state after this evaluation, for controllers that have one.
    pub state: Option<RobotState>,
    /// Target to show as a diagnostic marker.
    pub target: Option<TargetEstimate>,
}

pub trait BehaviorController: Send {
    fn name(&self) -> &'static str;

    fn trigger(&self) -> Trigger;

    fn evaluate(&mut self, signals: &SignalSnapshot, config: &FollowerConfig) -> Decision;

    /// Current discrete state, if the controller has one.
    fn state(&self) -> Option<RobotState> {
        None
    }

    /// Return to the initial state.
    fn reset(&mut self);
}

/// Build the controller selected by `policy`.
pub fn controller_for(policy: Policy) -> Box<dyn BehaviorController> {
    match policy {
        Policy::Blended => Box::new(BlendedController::new()),
        Policy::StateMachine => Box::new(StateMachineController::new()),
    }
}
