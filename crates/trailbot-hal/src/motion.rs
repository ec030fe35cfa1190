//! Odometry-driven open-loop motion primitives.
//!
//! [`MotionPrimitive`] drives the base a fixed distance or turns it through a
//! fixed angle, polling a [`PoseSource`] at `rate_hz` until the goal is
//! reached.  It is an optional capability: the behavior controllers never
//! call it.
//!
//! Rotation ramps the commanded rate down as the turn completes:
//!
//! ```text
//! ω = (speed - ω_min) * |remaining / total| + ω_min      ω_min = 0.4 rad/s
//! ```
//!
//! A failed pose lookup is retried `lookup_retries` times, `retry_wait`
//! apart.  After that the call is abandoned with
//! [`FollowError::TransformUnavailable`] and the last command is left in
//! place.

use std::f32::consts::TAU;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};
use trailbot_types::{FollowError, Pose2D, VelocityCommand, check_rate, rate_period};

use crate::drive::CommandSink;
use crate::sim::wrap_pi;

/// Slowest rotation rate the base reliably executes (rad/s).
pub const MIN_ANGULAR_SPEED: f32 = 0.4;

/// Turns smaller than this (rad) are skipped.
pub const MIN_TURN: f32 = 0.01;

/// Source of the robot's pose in the odometry frame.
pub trait PoseSource: Send {
    /// # Errors
    ///
    /// Returns [`FollowError::TransformUnavailable`] when the transform is
    /// not (yet) known.
    fn lookup(&mut self) -> Result<Pose2D, FollowError>;
}

impl<P: PoseSource + ?Sized> PoseSource for Box<P> {
    fn lookup(&mut self) -> Result<Pose2D, FollowError> {
        (**self).lookup()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    /// Control and polling rate (Hz).
    pub rate_hz: f32,
    /// Extra attempts after a failed pose lookup.
    pub lookup_retries: u32,
    pub retry_wait: Duration,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            rate_hz: 10.0,
            lookup_retries: 3,
            retry_wait: Duration::from_millis(100),
        }
    }
}

/// Closed-loop distance and rotation moves against a [`PoseSource`].
pub struct MotionPrimitive<S, P> {
    sink: S,
    poses: P,
    config: MotionConfig,
}

impl<S: CommandSink, P: PoseSource> MotionPrimitive<S, P> {
    /// # Errors
    ///
    /// Returns [`FollowError::InvalidConfig`] if `rate_hz` is outside the
    /// accepted loop-rate range.
    pub fn new(sink: S, poses: P, config: MotionConfig) -> Result<Self, FollowError> {
        check_rate("rate_hz", config.rate_hz)?;
        Ok(Self {
            sink,
            poses,
            config,
        })
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn into_parts(self) -> (S, P) {
        (self.sink, self.poses)
    }

    /// Drive straight until `distance` meters from the start pose.
    ///
    /// Returns the distance actually travelled.
    pub async fn move_distance(
        &mut self,
        speed: f32,
        distance: f32,
        forward: bool,
    ) -> Result<f32, FollowError> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(invalid("distance", "must be a non-negative number"));
        }
        if distance > 0.0 && !(speed.is_finite() && speed != 0.0) {
            return Err(invalid("speed", "must be non-zero"));
        }
        let linear = if forward { speed.abs() } else { -speed.abs() };

        let start = self.lookup().await?;
        let mut ticker = self.ticker();
        let mut travelled = 0.0;
        loop {
            ticker.tick().await;
            let pose = self.lookup().await?;
            travelled = (pose.x - start.x).hypot(pose.y - start.y);
            if travelled >= distance {
                break;
            }
            self.send(VelocityCommand::new(linear, 0.0));
        }
        self.send(VelocityCommand::zero());
        info!(travelled, distance, "move complete");
        Ok(travelled)
    }

    /// Turn in place through `radians` (wrapped into `[0, 2π]`).
    ///
    /// Returns the angle actually turned; `0.0` when the turn was too small
    /// to attempt.
    pub async fn rotate(
        &mut self,
        angular_speed: f32,
        radians: f32,
        clockwise: bool,
    ) -> Result<f32, FollowError> {
        if !radians.is_finite() {
            return Err(invalid("radians", "must be finite"));
        }
        let speed = if angular_speed.is_finite() {
            angular_speed.abs().max(MIN_ANGULAR_SPEED)
        } else {
            MIN_ANGULAR_SPEED
        };
        let total = wrap_turn(radians);
        if total < MIN_TURN {
            debug!(radians, "turn below minimum; skipping");
            return Ok(0.0);
        }
        let sign = if clockwise { -1.0 } else { 1.0 };

        let mut prev_yaw = self.lookup().await?.yaw;
        let mut turned = 0.0;
        let mut ticker = self.ticker();
        loop {
            ticker.tick().await;
            let yaw = self.lookup().await?.yaw;
            turned += wrap_pi(yaw - prev_yaw).abs();
            prev_yaw = yaw;
            if turned >= total {
                break;
            }
            let remaining = total - turned;
            let rate = (speed - MIN_ANGULAR_SPEED) * (remaining / total).abs() + MIN_ANGULAR_SPEED;
            self.send(VelocityCommand::new(0.0, sign * rate));
        }
        self.send(VelocityCommand::zero());
        info!(turned, total, "rotation complete");
        Ok(turned)
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = interval(rate_period(self.config.rate_hz));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn send(&mut self, cmd: VelocityCommand) {
        if let Err(e) = self.sink.publish(cmd) {
            warn!(sink = self.sink.id(), error = %e, "motion command not delivered");
        }
    }

    async fn lookup(&mut self) -> Result<Pose2D, FollowError> {
        let mut last = None;
        for attempt in 0..=self.config.lookup_retries {
            match self.poses.lookup() {
                Ok(pose) => return Ok(pose),
                Err(e) => {
                    warn!(attempt, error = %e, "pose lookup failed");
                    last = Some(e);
                    if attempt < self.config.lookup_retries {
                        sleep(self.config.retry_wait).await;
                    }
                }
            }
        }
        let reason = last.map_or_else(|| "no attempts".to_string(), |e| e.to_string());
        Err(FollowError::TransformUnavailable(format!(
            "giving up after {} attempts: {reason}",
            self.config.lookup_retries + 1
        )))
    }
}

/// Wrap into `[0, 2π]`, leaving a full turn as a full turn.
fn wrap_turn(radians: f32) -> f32 {
    if (0.0..=TAU).contains(&radians) {
        radians
    } else {
        radians.rem_euclid(TAU)
    }
}

fn invalid(field: &str, reason: &str) -> FollowError {
    FollowError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDriveBase, SimPoseSource};
    use std::f32::consts::FRAC_PI_2;

    fn primitive(base: &SimDriveBase) -> MotionPrimitive<SimDriveBase, SimPoseSource> {
        MotionPrimitive::new(
            base.clone(),
            base.pose_source(Duration::from_millis(100)),
            MotionConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn wrap_turn_keeps_full_turn() {
        assert!((wrap_turn(TAU) - TAU).abs() < 1e-6);
        assert!((wrap_turn(-FRAC_PI_2) - 3.0 * FRAC_PI_2).abs() < 1e-5);
        assert!((wrap_turn(TAU + 1.0) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn out_of_range_rate_rejected() {
        let base = SimDriveBase::new();
        for rate_hz in [0.0, -1.0, 1e10, 1e-30, f32::NAN] {
            let cfg = MotionConfig {
                rate_hz,
                ..MotionConfig::default()
            };
            assert!(
                MotionPrimitive::new(base.clone(), base.pose_source(Duration::ZERO), cfg).is_err(),
                "rate_hz {rate_hz} should be rejected"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn move_forward_reaches_distance_then_stops() {
        let base = SimDriveBase::new();
        let mut motion = primitive(&base);
        let travelled = motion.move_distance(0.5, 1.0, true).await.unwrap();
        assert!(travelled >= 1.0);
        assert!(base.pose().x > 0.99);
        assert!(base.last_command().unwrap().is_zero());
        assert!(base.commands().iter().all(|c| c.linear_x >= 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn move_backward_uses_negative_speed() {
        let base = SimDriveBase::new();
        let mut motion = primitive(&base);
        motion.move_distance(-0.5, 0.3, false).await.unwrap();
        assert!(base.pose().x < -0.29);
        assert!(base.commands()[0].linear_x < 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn rotate_ramps_down_and_stops() {
        let base = SimDriveBase::new();
        let mut motion = primitive(&base);
        let turned = motion.rotate(1.0, FRAC_PI_2, false).await.unwrap();
        assert!(turned >= FRAC_PI_2);

        let cmds = base.commands();
        assert!(cmds.last().unwrap().is_zero());
        let rates: Vec<f32> = cmds[..cmds.len() - 1].iter().map(|c| c.angular_z).collect();
        assert!(rates.iter().all(|w| *w >= MIN_ANGULAR_SPEED - 1e-6 && *w <= 1.0 + 1e-6));
        assert!(rates.windows(2).all(|w| w[1] <= w[0] + 1e-6), "rate must not increase");
    }

    #[tokio::test(start_paused = true)]
    async fn rotate_clockwise_is_negative_and_speed_clamped() {
        let base = SimDriveBase::new();
        let mut motion = primitive(&base);
        motion.rotate(0.1, 0.5, true).await.unwrap();
        let first = base.commands()[0];
        assert!((first.angular_z + MIN_ANGULAR_SPEED).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn tiny_turn_is_skipped() {
        let base = SimDriveBase::new();
        let mut motion = primitive(&base);
        assert_eq!(motion.rotate(1.0, 0.005, false).await.unwrap(), 0.0);
        assert!(base.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_lookup_failures_are_retried() {
        let base = SimDriveBase::new();
        let poses = base.pose_source(Duration::from_millis(100)).with_failures(2);
        let mut motion = MotionPrimitive::new(base.clone(), poses, MotionConfig::default()).unwrap();
        assert!(motion.move_distance(0.5, 0.2, true).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_lookup_failure_abandons_move() {
        let base = SimDriveBase::new();
        let poses = base.pose_source(Duration::from_millis(100)).with_failures(10);
        let mut motion = MotionPrimitive::new(base.clone(), poses, MotionConfig::default()).unwrap();
        let err = motion.rotate(1.0, 1.0, false).await.unwrap_err();
        assert!(matches!(err, FollowError::TransformUnavailable(_)));
        assert!(base.commands().is_empty());
    }
}
