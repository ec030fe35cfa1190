//! Follower configuration and its load-time validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::FollowError;

/// Slowest accepted loop rate (Hz).
pub const MIN_RATE_HZ: f32 = 0.1;
/// Fastest accepted loop rate (Hz).
pub const MAX_RATE_HZ: f32 = 1000.0;

/// Period of a loop running at `hz`, clamped to the accepted rate range.
///
/// Never zero, so it is always a valid `tokio::time::interval` period.
pub fn rate_period(hz: f32) -> Duration {
    let slowest = Duration::from_secs_f32(1.0 / MIN_RATE_HZ);
    let fastest = Duration::from_secs_f32(1.0 / MAX_RATE_HZ);
    Duration::try_from_secs_f32(1.0 / hz)
        .unwrap_or(slowest)
        .clamp(fastest, slowest)
}

/// Rejects rates `rate_period` would have to clamp.
pub fn check_rate(field: &str, hz: f32) -> Result<(), FollowError> {
    if hz.is_finite() && (MIN_RATE_HZ..=MAX_RATE_HZ).contains(&hz) {
        Ok(())
    } else {
        Err(invalid(
            field,
            &format!("must be between {MIN_RATE_HZ} and {MAX_RATE_HZ}"),
        ))
    }
}

/// Which behavior controller drives the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Continuous proportional law, evaluated on every depth frame.
    #[default]
    Blended,
    /// Four-state machine, evaluated at a fixed cadence.
    StateMachine,
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::Blended => write!(f, "blended"),
            Policy::StateMachine => write!(f, "state_machine"),
        }
    }
}

impl std::str::FromStr for Policy {
    type Err = FollowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blended" => Ok(Policy::Blended),
            "state_machine" | "fsm" => Ok(Policy::StateMachine),
            other => Err(FollowError::InvalidConfig {
                field: "policy".to_string(),
                reason: format!("unknown policy '{other}'"),
            }),
        }
    }
}

/// Camera-relative volume (meters) in which depth points count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBox {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub max_z: f32,
}

impl SearchBox {
    /// Strict containment test on the lateral axes.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        y > self.min_y && y < self.max_y && x > self.min_x && x < self.max_x
    }
}

/// Tunable parameters of the follower.
///
/// Every field has a default, so a partial TOML file only overrides the keys
/// it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    /// Minimum y of points in the search box (m).
    pub min_y: f32,
    /// Maximum y of points in the search box (m).
    pub max_y: f32,
    /// Minimum x of points in the search box (m).
    pub min_x: f32,
    /// Maximum x of points in the search box (m).
    pub max_x: f32,
    /// Maximum depth of points in the search box (m).
    pub max_z: f32,
    /// Distance at which to hold the target (m).
    pub goal_z: f32,
    /// Gain applied to the heading correction.
    pub z_scale: f32,
    /// Gain reserved for lateral correction.
    pub x_scale: f32,
    /// When false no non-zero command is ever emitted.
    pub enabled: bool,
    /// Point counts above this read as an obstacle.
    pub obstacle_point_threshold: u32,
    /// Face widths above this (px) read as "close to human".
    pub proximity_width_threshold: f32,
    /// Behavior controller that drives the base.
    pub policy: Policy,
    /// State-machine evaluation rate (Hz).
    pub tick_hz: f32,
    /// Detections older than this read as absent at a state-machine tick.
    pub signal_timeout_ms: u64,
    /// Width of the detector image (px), used for normalization.
    pub detector_frame_width: f32,
    /// Height of the detector image (px), used for normalization.
    pub detector_frame_height: f32,
    /// Face detections also count as the color target.
    pub face_drives_color_track: bool,
    /// Phrase handed to the greeter on entering ENGAGE.
    pub greeting: String,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            min_y: 0.1,
            max_y: 0.5,
            min_x: -0.2,
            max_x: 0.2,
            max_z: 0.8,
            goal_z: 0.6,
            z_scale: 1.0,
            x_scale: 5.0,
            enabled: true,
            obstacle_point_threshold: 4000,
            proximity_width_threshold: 100.0,
            policy: Policy::default(),
            tick_hz: 10.0,
            signal_timeout_ms: 1000,
            detector_frame_width: 640.0,
            detector_frame_height: 480.0,
            face_drives_color_track: true,
            greeting: "Hi, I am Trailbot. How are you?".to_string(),
        }
    }
}

impl FollowerConfig {
    pub fn search_box(&self) -> SearchBox {
        SearchBox {
            min_x: self.min_x,
            max_x: self.max_x,
            min_y: self.min_y,
            max_y: self.max_y,
            max_z: self.max_z,
        }
    }

    /// Reject geometry and gains that would make the controller misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`FollowError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), FollowError> {
        let finite = [
            ("min_x", self.min_x),
            ("max_x", self.max_x),
            ("min_y", self.min_y),
            ("max_y", self.max_y),
            ("max_z", self.max_z),
            ("goal_z", self.goal_z),
            ("z_scale", self.z_scale),
            ("x_scale", self.x_scale),
            ("proximity_width_threshold", self.proximity_width_threshold),
            ("tick_hz", self.tick_hz),
            ("detector_frame_width", self.detector_frame_width),
            ("detector_frame_height", self.detector_frame_height),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(invalid(field, "must be a finite number"));
            }
        }

        if self.min_x >= self.max_x {
            return Err(invalid("min_x", "must be less than max_x"));
        }
        if self.min_y >= self.max_y {
            return Err(invalid("min_y", "must be less than max_y"));
        }

        let positive = [
            ("max_z", self.max_z),
            ("z_scale", self.z_scale),
            ("x_scale", self.x_scale),
            ("proximity_width_threshold", self.proximity_width_threshold),
            ("detector_frame_width", self.detector_frame_width),
            ("detector_frame_height", self.detector_frame_height),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(invalid(field, "must be positive"));
            }
        }

        check_rate("tick_hz", self.tick_hz)?;

        if self.obstacle_point_threshold == 0 {
            return Err(invalid("obstacle_point_threshold", "must be positive"));
        }
        if self.signal_timeout_ms == 0 {
            return Err(invalid("signal_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> FollowError {
    FollowError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
