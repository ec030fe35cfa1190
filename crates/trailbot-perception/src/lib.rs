//! `trailbot-perception` – turns raw sensor data into follower signals.
//!
//! # Modules
//!
//! - [`scanner`] – [`DepthFieldScanner`][scanner::DepthFieldScanner]: projects
//!   a depth frame through cached bearing tables and aggregates the points
//!   inside the search box into a centroid, nearest depth and point count.
//! - [`obstacle`] – [`ObstacleMonitor`][obstacle::ObstacleMonitor]: point
//!   count threshold that yields the obstacle signal.
//! - [`fusion`] – [`TargetFusion`][fusion::TargetFusion]: per-source 50/50
//!   smoothing of depth, face and color detections into a
//!   [`SignalSnapshot`][fusion::SignalSnapshot].

pub mod fusion;
pub mod obstacle;
pub mod scanner;

pub use fusion::{Observation, SensorFusionState, SignalSnapshot, Smoothed, TargetFusion};
pub use obstacle::{ObstacleMonitor, is_obstacle};
pub use scanner::{BearingTables, CameraModel, DepthFieldScanner, RowPitch};
