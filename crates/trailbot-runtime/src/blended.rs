//! Blended controller.
//!
//! A continuous proportional law evaluated on every depth frame.  Branches
//! are tried in order:
//!
//! | Condition | Command |
//! |---|---|
//! | `n < threshold` and color target present | `(0.05, -x · z_scale)` |
//! | `n > threshold` | `(-2.5, 0)` |
//! | no color target | none (last command stays) |
//! | otherwise (`n == threshold`) | stop |

use tracing::debug;
use trailbot_perception::SignalSnapshot;
use trailbot_types::{FollowerConfig, VelocityCommand};

use crate::controller::{BehaviorController, Decision, Trigger};

/// Forward creep while tracking (m/s).
pub const TRACK_SPEED: f32 = 0.05;
/// Reverse speed when the box fills up (m/s).
pub const BACKOFF_SPEED: f32 = -2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Track,
    BackOff,
    Searching,
    Stop,
}

#[derive(Debug, Default)]
pub struct BlendedController {
    last_branch: Option<Branch>,
}

impl BlendedController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BehaviorController for BlendedController {
    fn name(&self) -> &'static str {
        "blended"
    }

    fn trigger(&self) -> Trigger {
        Trigger::DepthFrame
    }

    fn evaluate(&mut self, signals: &SignalSnapshot, config: &FollowerConfig) -> Decision {
        let threshold = config.obstacle_point_threshold;
        let n = signals.point_count;
        let target = signals.blended_target(threshold);

        let (branch, command) = if target.valid {
            let cmd = VelocityCommand::new(TRACK_SPEED, -target.x * config.z_scale);
            (Branch::Track, Some(cmd))
        } else if n > threshold {
            (Branch::BackOff, Some(VelocityCommand::new(BACKOFF_SPEED, 0.0)))
        } else if !signals.color_found {
            (Branch::Searching, None)
        } else {
            (Branch::Stop, Some(VelocityCommand::zero()))
        };

        if self.last_branch != Some(branch) {
            debug!(?branch, point_count = n, x = target.x, "blended branch");
            self.last_branch = Some(branch);
        }

        Decision {
            command,
            greet: false,
            state: None,
            target: Some(target),
        }
    }

    fn reset(&mut self) {
        self.last_branch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailbot_perception::Smoothed;
    use trailbot_types::UNBOUNDED_DEPTH;

    fn signals(n: u32, color: bool, x: f32) -> SignalSnapshot {
        SignalSnapshot {
            point_count: n,
            nearest_z: UNBOUNDED_DEPTH,
            depth: Smoothed::default(),
            depth_valid: n > 0,
            face: Smoothed::default(),
            face_found: false,
            close_to_human: false,
            color: Smoothed { x, y: 0.0 },
            color_found: color,
        }
    }

    fn run(n: u32, color: bool, x: f32) -> Option<VelocityCommand> {
        BlendedController::new()
            .evaluate(&signals(n, color, x), &FollowerConfig::default())
            .command
    }

    #[test]
    fn tracks_color_target_when_box_is_sparse() {
        let cmd = run(3999, true, 0.25).expect("command");
        assert!((cmd.linear_x - 0.05).abs() < 1e-6);
        assert!((cmd.angular_z + 0.25).abs() < 1e-6);
    }

    #[test]
    fn heading_gain_scales_turn() {
        let config = FollowerConfig {
            z_scale: 2.0,
            ..FollowerConfig::default()
        };
        let cmd = BlendedController::new()
            .evaluate(&signals(10, true, -0.1), &config)
            .command
            .expect("command");
        assert!((cmd.angular_z - 0.2).abs() < 1e-6);
    }

    #[test]
    fn backs_off_when_box_is_full() {
        for color in [true, false] {
            let cmd = run(4001, color, 0.25).expect("command");
            assert!((cmd.linear_x + 2.5).abs() < 1e-6);
            assert_eq!(cmd.angular_z, 0.0);
        }
    }

    #[test]
    fn no_command_without_color_target() {
        assert!(run(0, false, 0.0).is_none());
        assert!(run(4000, false, 0.0).is_none());
    }

    #[test]
    fn stops_at_exact_threshold_with_color() {
        let cmd = run(4000, true, 0.25).expect("command");
        assert!(cmd.is_zero());
    }

    #[test]
    fn target_is_always_reported() {
        let d = BlendedController::new().evaluate(&signals(0, false, 0.1), &FollowerConfig::default());
        let target = d.target.expect("target");
        assert!(!target.valid);
        assert!(!d.greet);
        assert!(d.state.is_none());
    }
}
