//! `trailbot-types` – shared data model for the follower stack.
//!
//! Sensor inputs ([`DepthFrame`], [`FaceObservation`], [`ColorObservation`]),
//! the perception outputs the controllers consume ([`DepthObservation`],
//! [`TargetEstimate`]), the actuation output ([`VelocityCommand`]) and the
//! event envelopes routed between crates.  Configuration lives in
//! [`config`].

pub mod config;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use config::{
    FollowerConfig, MAX_RATE_HZ, MIN_RATE_HZ, Policy, SearchBox, check_rate, rate_period,
};

/// Nearest-depth value reported when no point fell inside the search box.
pub const UNBOUNDED_DEPTH: f32 = 1.0e6;

// ────────────────────────────────────────────────────────────────────────────
// Actuation
// ────────────────────────────────────────────────────────────────────────────

/// Differential-drive velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Forward velocity (m/s); negative drives backwards.
    pub linear_x: f32,
    /// Yaw rate (rad/s); positive turns counter-clockwise.
    pub angular_z: f32,
}

impl VelocityCommand {
    pub fn new(linear_x: f32, angular_z: f32) -> Self {
        Self {
            linear_x,
            angular_z,
        }
    }

    /// The stop command.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.linear_x == 0.0 && self.angular_z == 0.0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Depth input
// ────────────────────────────────────────────────────────────────────────────

/// Raw depth samples in one of the two encodings depth cameras publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DepthSamples {
    /// 32-bit float meters; non-finite values are invalid.
    Meters(Vec<f32>),
    /// 16-bit unsigned millimeters; zero is invalid.
    Millimeters(Vec<u16>),
}

impl DepthSamples {
    /// Size of one sample in bytes, used to convert the row stride.
    pub fn sample_size(&self) -> usize {
        match self {
            DepthSamples::Meters(_) => std::mem::size_of::<f32>(),
            DepthSamples::Millimeters(_) => std::mem::size_of::<u16>(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DepthSamples::Meters(s) => s.len(),
            DepthSamples::Millimeters(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single row-major depth image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    /// Length of one row in bytes (may include padding).
    pub row_stride_bytes: u32,
    pub samples: DepthSamples,
}

impl DepthFrame {
    /// Build a tightly packed float-meters frame.
    pub fn from_meters(width: u32, height: u32, samples: Vec<f32>) -> Self {
        Self {
            width,
            height,
            row_stride_bytes: width * std::mem::size_of::<f32>() as u32,
            samples: DepthSamples::Meters(samples),
        }
    }

    /// Build a tightly packed 16-bit millimeter frame.
    pub fn from_millimeters(width: u32, height: u32, samples: Vec<u16>) -> Self {
        Self {
            width,
            height,
            row_stride_bytes: width * std::mem::size_of::<u16>() as u32,
            samples: DepthSamples::Millimeters(samples),
        }
    }

    /// Number of samples between the starts of consecutive rows.
    ///
    /// A stride narrower than the image is treated as a packed frame.
    pub fn row_stride_samples(&self) -> usize {
        let stride = self.row_stride_bytes as usize / self.samples.sample_size();
        stride.max(self.width as usize)
    }
}

/// Mean position of the in-box depth points, meters from the optical axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f32,
    pub y: f32,
}

/// Aggregate of the depth points that fell inside the search box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthObservation {
    /// `None` when no point was accepted.
    pub centroid: Option<Centroid>,
    /// Closest accepted depth, or [`UNBOUNDED_DEPTH`] when empty.
    pub nearest_z: f32,
    pub point_count: u32,
}

impl DepthObservation {
    /// The "no candidate points" observation.
    pub fn empty() -> Self {
        Self {
            centroid: None,
            nearest_z: UNBOUNDED_DEPTH,
            point_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Detector input
// ────────────────────────────────────────────────────────────────────────────

/// A point in detector image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f32,
    pub y: f32,
}

/// One face bounding box reported by the face detector (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn is_finite(&self) -> bool {
        self.center_x.is_finite()
            && self.center_y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }
}

/// Output of the face detector; an empty list means "not found".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceObservation {
    pub faces: Vec<FaceBox>,
}

impl FaceObservation {
    /// The face the follower tracks: the first one, if it is well formed.
    pub fn primary(&self) -> Option<&FaceBox> {
        self.faces.first().filter(|f| f.is_finite())
    }
}

/// Output of the color-blob detector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorObservation {
    pub present: bool,
    /// Blob center, when the detector reports one.
    #[serde(default)]
    pub center: Option<PixelPoint>,
}

// ────────────────────────────────────────────────────────────────────────────
// Perception output
// ────────────────────────────────────────────────────────────────────────────

/// Which sensor produced a [`TargetEstimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Depth,
    Face,
    Color,
}

/// Smoothed target position, normalized to `[-0.5, 0.5]` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetEstimate {
    pub x: f32,
    pub y: f32,
    pub valid: bool,
    pub provenance: Provenance,
}

/// Discrete behavior of the state-machine controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RobotState {
    #[default]
    Search,
    Avoid,
    Approach,
    Engage,
}

impl std::fmt::Display for RobotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RobotState::Search => write!(f, "SEARCH"),
            RobotState::Avoid => write!(f, "AVOID"),
            RobotState::Approach => write!(f, "APPROACH"),
            RobotState::Engage => write!(f, "ENGAGE"),
        }
    }
}

/// Planar robot pose in the odometry frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f32,
    pub y: f32,
    /// Heading, counter-clockwise from +X (radians).
    pub yaw: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Administrative surface
// ────────────────────────────────────────────────────────────────────────────

/// Requested following mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowState {
    Stopped,
    Follow,
}

/// Outcome of a `set_following` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowResult {
    Ok,
    Error,
}

// ────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerShape {
    Sphere,
    Cube,
}

/// RGBA color, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// A visualization marker in the camera optical frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: u32,
    pub shape: MarkerShape,
    pub position: [f32; 3],
    pub scale: [f32; 3],
    pub color: Rgba,
}

// ────────────────────────────────────────────────────────────────────────────
// Event envelopes
// ────────────────────────────────────────────────────────────────────────────

/// Payload of an inbound [`SensorEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorPayload {
    Depth(DepthFrame),
    Faces(FaceObservation),
    Color(ColorObservation),
}

/// An inbound sensor message, stamped on arrival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"camera/depth"`, `"person_detection/faces"`.
    pub source: String,
    pub payload: SensorPayload,
}

impl SensorEvent {
    pub fn new(source: impl Into<String>, payload: SensorPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the outbound event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusPayload {
    Command(VelocityCommand),
    Markers(Vec<Marker>),
    Greeting(String),
    StateChanged(RobotState),
    Fault { component: String, message: String },
}

/// Outbound event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"trailbot-runtime::control_loop"`
    pub source: String,
    pub payload: BusPayload,
}

impl BusEvent {
    pub fn new(source: impl Into<String>, payload: BusPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every trailbot crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FollowError {
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Configuration I/O error: {0}")]
    ConfigIo(String),

    #[error("Actuation failed on {component}: {details}")]
    Actuation { component: String, details: String },

    #[error("Pose transform unavailable: {0}")]
    TransformUnavailable(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
