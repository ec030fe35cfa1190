//! In-process simulated drivers for headless tests and the demo binary.
//!
//! [`SimDriveBase`] integrates published velocity commands into a planar
//! pose (unicycle model).  [`SimPoseSource`] reads that pose back, advancing
//! the simulation by a fixed step on every lookup, so closed-loop code runs
//! deterministically without a clock.  [`SimGreeter`] and [`SimMarkerSink`]
//! record what they receive.
//!
//! All simulated drivers are cheap `Clone` handles onto shared state: keep a
//! clone to inspect what the code under test did after handing the other
//! clone away.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use trailbot_hal::drive::CommandSink;
//! use trailbot_hal::motion::PoseSource;
//! use trailbot_hal::sim::SimDriveBase;
//! use trailbot_types::VelocityCommand;
//!
//! let base = SimDriveBase::new();
//! let mut poses = base.pose_source(Duration::from_millis(100));
//! let mut sink = base.clone();
//!
//! sink.publish(VelocityCommand::new(1.0, 0.0)).unwrap();
//! let pose = poses.lookup().unwrap();
//! assert!((pose.x - 0.1).abs() < 1e-5);
//! ```

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use trailbot_types::{FollowError, Marker, Pose2D, VelocityCommand};

use crate::display::MarkerSink;
use crate::drive::CommandSink;
use crate::greeter::Greeter;
use crate::motion::PoseSource;

/// Wrap an angle into `(-π, π]`.
pub fn wrap_pi(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI { wrapped + 2.0 * PI } else { wrapped }
}

// ────────────────────────────────────────────────────────────────────────────
// Drive base
// ────────────────────────────────────────────────────────────────────────────

/// Commands kept by [`SimDriveBase`]; older ones are dropped.
pub const COMMAND_HISTORY_LEN: usize = 1024;

#[derive(Debug, Default)]
struct DriveState {
    pose: Pose2D,
    command: VelocityCommand,
    history: VecDeque<VelocityCommand>,
}

/// A simulated differential-drive base.  Always accepts commands.
#[derive(Debug, Clone, Default)]
pub struct SimDriveBase {
    state: Arc<Mutex<DriveState>>,
}

impl SimDriveBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the simulation at `pose` instead of the origin.
    pub fn with_pose(self, pose: Pose2D) -> Self {
        self.state.lock().pose = pose;
        self
    }

    /// A pose source reading this base, advancing `step` per lookup.
    pub fn pose_source(&self, step: Duration) -> SimPoseSource {
        SimPoseSource {
            base: self.clone(),
            step,
            failures: 0,
        }
    }

    /// Integrate the current command over `dt`.
    pub fn advance(&self, dt: Duration) {
        let dt = dt.as_secs_f32();
        let mut s = self.state.lock();
        let cmd = s.command;
        s.pose.yaw = wrap_pi(s.pose.yaw + cmd.angular_z * dt);
        s.pose.x += cmd.linear_x * s.pose.yaw.cos() * dt;
        s.pose.y += cmd.linear_x * s.pose.yaw.sin() * dt;
    }

    pub fn pose(&self) -> Pose2D {
        self.state.lock().pose
    }

    /// The last [`COMMAND_HISTORY_LEN`] commands, oldest first.
    pub fn commands(&self) -> Vec<VelocityCommand> {
        self.state.lock().history.iter().copied().collect()
    }

    pub fn last_command(&self) -> Option<VelocityCommand> {
        self.state.lock().history.back().copied()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }
}

impl CommandSink for SimDriveBase {
    fn id(&self) -> &str {
        "sim_drive_base"
    }

    fn publish(&mut self, cmd: VelocityCommand) -> Result<(), FollowError> {
        let mut s = self.state.lock();
        s.command = cmd;
        if s.history.len() == COMMAND_HISTORY_LEN {
            s.history.pop_front();
        }
        s.history.push_back(cmd);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose source
// ────────────────────────────────────────────────────────────────────────────

/// Odometry view of a [`SimDriveBase`].
#[derive(Debug, Clone)]
pub struct SimPoseSource {
    base: SimDriveBase,
    step: Duration,
    failures: u32,
}

impl SimPoseSource {
    /// Fail the next `n` lookups with [`FollowError::TransformUnavailable`].
    pub fn with_failures(mut self, n: u32) -> Self {
        self.failures = n;
        self
    }
}

impl PoseSource for SimPoseSource {
    fn lookup(&mut self) -> Result<Pose2D, FollowError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(FollowError::TransformUnavailable(
                "odom -> base_link not yet available".to_string(),
            ));
        }
        self.base.advance(self.step);
        Ok(self.base.pose())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Greeter and marker display
// ────────────────────────────────────────────────────────────────────────────

/// Records every greeting phrase.  Always succeeds.
#[derive(Debug, Clone, Default)]
pub struct SimGreeter {
    said: Arc<Mutex<Vec<String>>>,
}

impl SimGreeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phrases(&self) -> Vec<String> {
        self.said.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.said.lock().len()
    }
}

impl Greeter for SimGreeter {
    fn greet(&mut self, phrase: &str) -> Result<(), FollowError> {
        self.said.lock().push(phrase.to_string());
        Ok(())
    }
}

/// Keeps the most recent marker frame and a frame count.
#[derive(Debug, Clone, Default)]
pub struct SimMarkerSink {
    inner: Arc<Mutex<(Vec<Marker>, usize)>>,
}

impl SimMarkerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Vec<Marker> {
        self.inner.lock().0.clone()
    }

    pub fn frames(&self) -> usize {
        self.inner.lock().1
    }
}

impl MarkerSink for SimMarkerSink {
    fn publish_markers(&mut self, markers: &[Marker]) -> Result<(), FollowError> {
        let mut inner = self.inner.lock();
        inner.0 = markers.to_vec();
        inner.1 += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(100);

    #[test]
    fn wrap_pi_stays_in_range() {
        assert!((wrap_pi(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
        assert!((wrap_pi(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        assert!((wrap_pi(PI) - PI).abs() < 1e-5);
        assert!(wrap_pi(0.0).abs() < 1e-6);
    }

    #[test]
    fn drive_base_integrates_forward_motion() {
        let mut base = SimDriveBase::new();
        base.publish(VelocityCommand::new(0.5, 0.0)).unwrap();
        for _ in 0..10 {
            base.advance(STEP);
        }
        let pose = base.pose();
        assert!((pose.x - 0.5).abs() < 1e-4);
        assert!(pose.y.abs() < 1e-6);
    }

    #[test]
    fn command_history_is_bounded() {
        let mut base = SimDriveBase::new();
        let total = COMMAND_HISTORY_LEN + 10;
        for i in 0..total {
            base.publish(VelocityCommand::new(i as f32, 0.0)).unwrap();
        }
        let cmds = base.commands();
        assert_eq!(cmds.len(), COMMAND_HISTORY_LEN);
        assert!((cmds[0].linear_x - 10.0).abs() < 1e-6, "oldest commands dropped first");
        assert!((base.last_command().unwrap().linear_x - (total - 1) as f32).abs() < 1e-6);
    }

    #[test]
    fn drive_base_integrates_rotation() {
        let mut base = SimDriveBase::new();
        base.publish(VelocityCommand::new(0.0, 1.0)).unwrap();
        base.advance(Duration::from_millis(500));
        assert!((base.pose().yaw - 0.5).abs() < 1e-5);
    }

    #[test]
    fn history_records_every_command() {
        let mut base = SimDriveBase::new();
        base.publish(VelocityCommand::new(0.3, 0.0)).unwrap();
        base.publish(VelocityCommand::zero()).unwrap();
        assert_eq!(base.commands().len(), 2);
        assert!(base.last_command().unwrap().is_zero());
        base.clear_history();
        assert!(base.commands().is_empty());
    }

    #[test]
    fn pose_source_shares_state_with_base() {
        let base = SimDriveBase::new();
        let mut sink = base.clone();
        let mut poses = base.pose_source(STEP);
        sink.publish(VelocityCommand::new(1.0, 0.0)).unwrap();
        poses.lookup().unwrap();
        poses.lookup().unwrap();
        assert!((base.pose().x - 0.2).abs() < 1e-5);
    }

    #[test]
    fn pose_source_injected_failures() {
        let base = SimDriveBase::new();
        let mut poses = base.pose_source(STEP).with_failures(2);
        assert!(matches!(
            poses.lookup(),
            Err(FollowError::TransformUnavailable(_))
        ));
        assert!(poses.lookup().is_err());
        assert!(poses.lookup().is_ok());
    }

    #[test]
    fn greeter_and_marker_sink_record() {
        let greeter = SimGreeter::new();
        let mut g = greeter.clone();
        g.greet("hi").unwrap();
        assert_eq!(greeter.phrases(), vec!["hi".to_string()]);
        assert_eq!(greeter.count(), 1);

        let display = SimMarkerSink::new();
        let mut d = display.clone();
        d.publish_markers(&[]).unwrap();
        d.publish_markers(&[]).unwrap();
        assert_eq!(display.frames(), 2);
        assert!(display.latest().is_empty());
    }
}
