//! Obstacle Monitor.
//!
//! Turns the scanner's point count into a boolean obstacle signal.  The
//! boundary is exclusive: exactly `threshold` points is *not* an obstacle.
//!
//! The same count also grows when the followed target itself fills the
//! search box, so "obstacle" here means "something large and close".

use tracing::info;

/// `true` when `point_count` exceeds `threshold`.
pub fn is_obstacle(point_count: u32, threshold: u32) -> bool {
    point_count > threshold
}

/// Stateful wrapper around [`is_obstacle`] that logs transitions instead of
/// reporting every frame.
#[derive(Debug, Clone)]
pub struct ObstacleMonitor {
    threshold: u32,
    last: Option<bool>,
}

impl ObstacleMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            last: None,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold;
    }

    /// Classify `point_count`, logging when the signal flips.
    pub fn update(&mut self, point_count: u32) -> bool {
        let obstacle = is_obstacle(point_count, self.threshold);
        if self.last != Some(obstacle) {
            if obstacle {
                info!(point_count, threshold = self.threshold, "obstacle detected");
            } else {
                info!(point_count, threshold = self.threshold, "obstacle cleared");
            }
            self.last = Some(obstacle);
        }
        obstacle
    }

    /// Most recent classification, `false` before the first frame.
    pub fn current(&self) -> bool {
        self.last.unwrap_or(false)
    }
}
