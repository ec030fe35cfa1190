//! Four-state behavior machine.
//!
//! Evaluated at a fixed cadence from three boolean inputs:
//!
//! | face | obstacle | close | state |
//! |---|---|---|---|
//! | F | F | F | SEARCH |
//! | any | T | F | AVOID |
//! | T | F | F | APPROACH |
//! | T | any | T | ENGAGE |
//! | otherwise | | | SEARCH |
//!
//! A close face wins over an obstacle: the person filling the depth box is
//! usually the one being greeted.
//!
//! Actions per state: SEARCH drives forward, AVOID reverses, APPROACH creeps
//! forward while turning toward the face, ENGAGE holds the last command and
//! greets once on entry.

use tracing::info;
use trailbot_perception::SignalSnapshot;
use trailbot_types::{FollowerConfig, RobotState, VelocityCommand};

use crate::controller::{BehaviorController, Decision, Trigger};
use crate::dwell::DwellTracker;

pub const SEARCH_SPEED: f32 = 0.3;
pub const AVOID_SPEED: f32 = -1.0;
pub const APPROACH_SPEED: f32 = 0.2;

/// Pure transition function.
pub fn next_state(face_found: bool, obstacle: bool, close_to_human: bool) -> RobotState {
    match (face_found, obstacle, close_to_human) {
        (true, _, true) => RobotState::Engage,
        (_, true, false) => RobotState::Avoid,
        (true, false, false) => RobotState::Approach,
        _ => RobotState::Search,
    }
}

/// Command issued in `state`; `None` for ENGAGE.
pub fn action(state: RobotState, face_x: f32, z_scale: f32) -> Option<VelocityCommand> {
    match state {
        RobotState::Search => Some(VelocityCommand::new(SEARCH_SPEED, 0.0)),
        RobotState::Avoid => Some(VelocityCommand::new(AVOID_SPEED, 0.0)),
        RobotState::Approach => Some(VelocityCommand::new(APPROACH_SPEED, -face_x * z_scale)),
        RobotState::Engage => None,
    }
}

#[derive(Debug, Default)]
pub struct StateMachineController {
    state: RobotState,
    dwell: DwellTracker<RobotState>,
}

impl StateMachineController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BehaviorController for StateMachineController {
    fn name(&self) -> &'static str {
        "state_machine"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Tick
    }

    fn evaluate(&mut self, signals: &SignalSnapshot, config: &FollowerConfig) -> Decision {
        let obstacle = signals.obstacle(config.obstacle_point_threshold);
        let next = next_state(signals.face_found, obstacle, signals.close_to_human);
        let entered = self.dwell.record(next);
        if next != self.state {
            info!(from = %self.state, to = %next, "state change");
            self.state = next;
        }

        let target = signals.face_target();
        Decision {
            command: action(next, target.x, config.z_scale),
            greet: entered && next == RobotState::Engage,
            state: Some(next),
            target: target.valid.then_some(target),
        }
    }

    fn state(&self) -> Option<RobotState> {
        Some(self.state)
    }

    fn reset(&mut self) {
        self.state = RobotState::Search;
        self.dwell.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailbot_perception::Smoothed;
    use trailbot_types::UNBOUNDED_DEPTH;

    fn signals(face: bool, obstacle: bool, close: bool, x: f32) -> SignalSnapshot {
        SignalSnapshot {
            point_count: if obstacle { 5000 } else { 100 },
            nearest_z: UNBOUNDED_DEPTH,
            depth: Smoothed::default(),
            depth_valid: true,
            face: Smoothed { x, y: 0.0 },
            face_found: face,
            close_to_human: close,
            color: Smoothed::default(),
            color_found: false,
        }
    }

    #[test]
    fn transition_table_is_exhaustive() {
        use RobotState::*;
        let cases = [
            ((false, false, false), Search),
            ((false, false, true), Search),
            ((false, true, false), Avoid),
            ((false, true, true), Search),
            ((true, false, false), Approach),
            ((true, false, true), Engage),
            ((true, true, false), Avoid),
            ((true, true, true), Engage),
        ];
        for ((face, obstacle, close), expected) in cases {
            assert_eq!(
                next_state(face, obstacle, close),
                expected,
                "face={face} obstacle={obstacle} close={close}"
            );
        }
    }

    #[test]
    fn actions_per_state() {
        let search = action(RobotState::Search, 0.0, 1.0).unwrap();
        assert!((search.linear_x - 0.3).abs() < 1e-6);
        let avoid = action(RobotState::Avoid, 0.0, 1.0).unwrap();
        assert!((avoid.linear_x + 1.0).abs() < 1e-6);
        let approach = action(RobotState::Approach, 0.25, 2.0).unwrap();
        assert!((approach.linear_x - 0.2).abs() < 1e-6);
        assert!((approach.angular_z + 0.5).abs() < 1e-6);
        assert!(action(RobotState::Engage, 0.25, 1.0).is_none());
    }

    #[test]
    fn greets_once_per_engage_dwell() {
        let mut fsm = StateMachineController::new();
        let config = FollowerConfig::default();
        let close = signals(true, false, true, 0.0);
        let greetings = (0..20).filter(|_| fsm.evaluate(&close, &config).greet).count();
        assert_eq!(greetings, 1);
        assert_eq!(fsm.state(), Some(RobotState::Engage));
    }

    #[test]
    fn re_entering_engage_greets_again() {
        let mut fsm = StateMachineController::new();
        let config = FollowerConfig::default();
        assert!(fsm.evaluate(&signals(true, false, true, 0.0), &config).greet);
        assert!(!fsm.evaluate(&signals(false, false, false, 0.0), &config).greet);
        assert!(fsm.evaluate(&signals(true, false, true, 0.0), &config).greet);
    }

    #[test]
    fn engage_overrides_obstacle() {
        let mut fsm = StateMachineController::new();
        let d = fsm.evaluate(&signals(true, true, true, 0.0), &FollowerConfig::default());
        assert_eq!(d.state, Some(RobotState::Engage));
        assert!(d.command.is_none());
    }

    #[test]
    fn reset_returns_to_search() {
        let mut fsm = StateMachineController::new();
        let config = FollowerConfig::default();
        fsm.evaluate(&signals(true, false, true, 0.0), &config);
        fsm.reset();
        assert_eq!(fsm.state(), Some(RobotState::Search));
        assert!(fsm.evaluate(&signals(true, false, true, 0.0), &config).greet);
    }

    #[test]
    fn approach_turns_toward_face() {
        let mut fsm = StateMachineController::new();
        let d = fsm.evaluate(&signals(true, false, false, 0.2), &FollowerConfig::default());
        let cmd = d.command.unwrap();
        assert!((cmd.angular_z + 0.2).abs() < 1e-6);
        assert!(d.target.unwrap().valid);
    }
}
