//! Target Fusion.
//!
//! Folds heterogeneous, asynchronous target observations (depth centroid,
//! face detections, color-blob detections) into one owned
//! [`SensorFusionState`] and hands out normalized [`TargetEstimate`]s.
//!
//! Each source keeps its own smoothed track.  Every new detection is blended
//! 50/50 with the previous smoothed value:
//!
//! ```text
//! norm      = (pixel - dim / 2) / dim          // ∈ [-0.5, 0.5]
//! smoothed' = (norm + smoothed) / 2
//! ```
//!
//! The blend runs once per detection, not per unit time.  A missing
//! detection clears the source's presence flag but keeps its smoothed value,
//! so the next detection resumes from the last known position.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use trailbot_perception::fusion::{Observation, TargetFusion};
//! use trailbot_types::{FaceBox, FaceObservation, FollowerConfig, Provenance};
//!
//! let mut fusion = TargetFusion::new(&FollowerConfig::default());
//! let face = FaceObservation {
//!     faces: vec![FaceBox { center_x: 480.0, center_y: 240.0, width: 60.0, height: 60.0 }],
//! };
//! let est = fusion.update(Observation::Face(face), Instant::now());
//! assert_eq!(est.provenance, Provenance::Face);
//! assert!(est.valid);
//! assert!((est.x - 0.125).abs() < 1e-6); // (0.25 + 0.0) / 2
//! ```

use std::time::{Duration, Instant};

use trailbot_types::{
    ColorObservation, DepthObservation, FaceObservation, FollowerConfig, PixelPoint, Provenance,
    SearchBox, TargetEstimate, UNBOUNDED_DEPTH,
};

use crate::obstacle::is_obstacle;

// ────────────────────────────────────────────────────────────────────────────
// Input
// ────────────────────────────────────────────────────────────────────────────

/// One observation from any of the three target sources.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Depth(DepthObservation),
    Face(FaceObservation),
    Color(ColorObservation),
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

/// A two-sample running average in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Smoothed {
    pub x: f32,
    pub y: f32,
}

impl Smoothed {
    fn blend(&mut self, x: f32, y: f32) {
        self.x = (x + self.x) / 2.0;
        self.y = (y + self.y) / 2.0;
    }
}

/// All cross-call sensor state of the follower.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFusionState {
    pub depth: Smoothed,
    pub face: Smoothed,
    pub color: Smoothed,
    pub depth_valid: bool,
    pub face_found: bool,
    pub color_found: bool,
    /// Primary face wider than the proximity threshold.
    pub close_to_human: bool,
    /// Point count of the latest depth observation.
    pub point_count: u32,
    pub nearest_z: f32,
    pub face_seen_at: Option<Instant>,
    pub color_seen_at: Option<Instant>,
}

impl Default for SensorFusionState {
    fn default() -> Self {
        Self {
            depth: Smoothed::default(),
            face: Smoothed::default(),
            color: Smoothed::default(),
            depth_valid: false,
            face_found: false,
            color_found: false,
            close_to_human: false,
            point_count: 0,
            nearest_z: UNBOUNDED_DEPTH,
            face_seen_at: None,
            color_seen_at: None,
        }
    }
}

/// Read-only view of the fused signals handed to a behavior controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSnapshot {
    pub point_count: u32,
    pub nearest_z: f32,
    pub depth: Smoothed,
    pub depth_valid: bool,
    pub face: Smoothed,
    pub face_found: bool,
    pub close_to_human: bool,
    pub color: Smoothed,
    pub color_found: bool,
}

impl SignalSnapshot {
    pub fn obstacle(&self, threshold: u32) -> bool {
        is_obstacle(self.point_count, threshold)
    }

    /// Target used by the blended controller: the color track, valid only
    /// while few points are in the box and a color match is present.
    pub fn blended_target(&self, threshold: u32) -> TargetEstimate {
        TargetEstimate {
            x: self.color.x,
            y: self.color.y,
            valid: self.point_count < threshold && self.color_found,
            provenance: Provenance::Color,
        }
    }

    /// Target used by the state machine: the face track alone.
    pub fn face_target(&self) -> TargetEstimate {
        TargetEstimate {
            x: self.face.x,
            y: self.face.y,
            valid: self.face_found,
            provenance: Provenance::Face,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TargetFusion
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct FusionParams {
    frame_width: f32,
    frame_height: f32,
    proximity_width: f32,
    face_drives_color: bool,
    search: SearchBox,
}

impl FusionParams {
    fn from_config(config: &FollowerConfig) -> Self {
        Self {
            frame_width: config.detector_frame_width,
            frame_height: config.detector_frame_height,
            proximity_width: config.proximity_width_threshold,
            face_drives_color: config.face_drives_color_track,
            search: config.search_box(),
        }
    }

    fn normalize_pixel(&self, p: PixelPoint) -> (f32, f32) {
        (
            normalize(p.x, self.frame_width),
            normalize(p.y, self.frame_height),
        )
    }

    /// Map a search-box centroid (meters) onto `[-0.5, 0.5]`.
    fn normalize_centroid(&self, x: f32, y: f32) -> (f32, f32) {
        let s = &self.search;
        let nx = (x - (s.min_x + s.max_x) / 2.0) / (s.max_x - s.min_x);
        let ny = (y - (s.min_y + s.max_y) / 2.0) / (s.max_y - s.min_y);
        (nx.clamp(-0.5, 0.5), ny.clamp(-0.5, 0.5))
    }
}

fn normalize(pixel: f32, dim: f32) -> f32 {
    ((pixel - dim / 2.0) / dim).clamp(-0.5, 0.5)
}

/// Owner of the [`SensorFusionState`].
///
/// Construct with [`TargetFusion::new`], feed observations through
/// [`TargetFusion::update`], and read the fused view with
/// [`TargetFusion::signals`].
#[derive(Debug, Clone)]
pub struct TargetFusion {
    params: FusionParams,
    state: SensorFusionState,
}

impl TargetFusion {
    pub fn new(config: &FollowerConfig) -> Self {
        Self {
            params: FusionParams::from_config(config),
            state: SensorFusionState::default(),
        }
    }

    /// Adopt new normalization parameters; smoothed tracks are kept.
    pub fn reconfigure(&mut self, config: &FollowerConfig) {
        self.params = FusionParams::from_config(config);
    }

    pub fn state(&self) -> &SensorFusionState {
        &self.state
    }

    /// Fold one observation into the state and return that source's estimate.
    pub fn update(&mut self, obs: Observation, now: Instant) -> TargetEstimate {
        match obs {
            Observation::Depth(depth) => self.update_depth(&depth),
            Observation::Face(faces) => self.update_face(&faces, now),
            Observation::Color(color) => self.update_color(&color, now),
        }
    }

    fn update_depth(&mut self, obs: &DepthObservation) -> TargetEstimate {
        let s = &mut self.state;
        s.point_count = obs.point_count;
        s.nearest_z = obs.nearest_z;
        s.depth_valid = obs.centroid.is_some();
        if let Some(c) = obs.centroid {
            let (x, y) = self.params.normalize_centroid(c.x, c.y);
            s.depth.blend(x, y);
        }
        TargetEstimate {
            x: s.depth.x,
            y: s.depth.y,
            valid: s.depth_valid,
            provenance: Provenance::Depth,
        }
    }

    fn update_face(&mut self, obs: &FaceObservation, now: Instant) -> TargetEstimate {
        let params = &self.params;
        let s = &mut self.state;
        match obs.primary() {
            Some(face) => {
                let (x, y) = params.normalize_pixel(PixelPoint {
                    x: face.center_x,
                    y: face.center_y,
                });
                s.face.blend(x, y);
                s.face_found = true;
                s.face_seen_at = Some(now);
                s.close_to_human = face.width > params.proximity_width;
                if params.face_drives_color {
                    s.color.blend(x, y);
                    s.color_found = true;
                    s.color_seen_at = Some(now);
                }
            }
            None => {
                s.face_found = false;
                s.close_to_human = false;
                if params.face_drives_color {
                    s.color_found = false;
                }
            }
        }
        TargetEstimate {
            x: s.face.x,
            y: s.face.y,
            valid: s.face_found,
            provenance: Provenance::Face,
        }
    }

    fn update_color(&mut self, obs: &ColorObservation, now: Instant) -> TargetEstimate {
        let s = &mut self.state;
        s.color_found = obs.present;
        if obs.present {
            s.color_seen_at = Some(now);
            if let Some(center) = obs.center.filter(|c| c.x.is_finite() && c.y.is_finite()) {
                let (x, y) = self.params.normalize_pixel(center);
                s.color.blend(x, y);
            }
        }
        TargetEstimate {
            x: s.color.x,
            y: s.color.y,
            valid: s.color_found,
            provenance: Provenance::Color,
        }
    }

    /// Fused view at `now`.
    ///
    /// With `max_age` set, face and color presence older than `max_age`
    /// read as absent.
    pub fn signals(&self, now: Instant, max_age: Option<Duration>) -> SignalSnapshot {
        let s = &self.state;
        let fresh = |seen: Option<Instant>| match (max_age, seen) {
            (None, _) => true,
            (Some(age), Some(at)) => now.saturating_duration_since(at) <= age,
            (Some(_), None) => false,
        };
        let face_found = s.face_found && fresh(s.face_seen_at);
        SignalSnapshot {
            point_count: s.point_count,
            nearest_z: s.nearest_z,
            depth: s.depth,
            depth_valid: s.depth_valid,
            face: s.face,
            face_found,
            close_to_human: face_found && s.close_to_human,
            color: s.color,
            color_found: s.color_found && fresh(s.color_seen_at),
        }
    }

    pub fn blended_target(&self, threshold: u32) -> TargetEstimate {
        self.signals(Instant::now(), None).blended_target(threshold)
    }

    pub fn face_target(&self) -> TargetEstimate {
        self.signals(Instant::now(), None).face_target()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use trailbot_types::{Centroid, FaceBox};

    fn face_at(x: f32, y: f32, width: f32) -> Observation {
        Observation::Face(FaceObservation {
            faces: vec![FaceBox {
                center_x: x,
                center_y: y,
                width,
                height: width,
            }],
        })
    }

    fn no_face() -> Observation {
        Observation::Face(FaceObservation::default())
    }

    fn depth(n: u32) -> Observation {
        Observation::Depth(DepthObservation {
            centroid: Some(Centroid { x: 0.0, y: 0.3 }),
            nearest_z: 0.6,
            point_count: n,
        })
    }

    #[test]
    fn first_detection_blends_with_zero() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        // 640 px wide: (480 - 320) / 640 = 0.25 → (0.25 + 0) / 2
        let est = fusion.update(face_at(480.0, 240.0, 50.0), Instant::now());
        assert!((est.x - 0.125).abs() < 1e-6);
        assert!(est.y.abs() < 1e-6);
    }

    #[test]
    fn repeated_detection_converges_by_halves() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let now = Instant::now();
        fusion.update(face_at(480.0, 240.0, 50.0), now);
        let est = fusion.update(face_at(480.0, 240.0, 50.0), now);
        // (0.25 + 0.125) / 2
        assert!((est.x - 0.1875).abs() < 1e-6);
    }

    #[test]
    fn absence_clears_presence_but_keeps_track() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let now = Instant::now();
        fusion.update(face_at(480.0, 240.0, 150.0), now);
        let est = fusion.update(no_face(), now);
        assert!(!est.valid);
        assert!((est.x - 0.125).abs() < 1e-6);
        assert!(!fusion.state().close_to_human);

        // Next detection resumes from 0.125, not from zero.
        let est = fusion.update(face_at(480.0, 240.0, 50.0), now);
        assert!((est.x - 0.1875).abs() < 1e-6);
    }

    #[test]
    fn wide_face_sets_close_to_human() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let now = Instant::now();
        fusion.update(face_at(320.0, 240.0, 100.0), now);
        assert!(!fusion.state().close_to_human, "threshold is exclusive");
        fusion.update(face_at(320.0, 240.0, 101.0), now);
        assert!(fusion.state().close_to_human);
    }

    #[test]
    fn face_drives_color_track_by_default() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let now = Instant::now();
        fusion.update(face_at(480.0, 240.0, 50.0), now);
        let snap = fusion.signals(now, None);
        assert!(snap.color_found);
        assert!((snap.color.x - 0.125).abs() < 1e-6);

        fusion.update(no_face(), now);
        assert!(!fusion.signals(now, None).color_found);
    }

    #[test]
    fn color_track_independent_when_face_does_not_drive_it() {
        let config = FollowerConfig {
            face_drives_color_track: false,
            ..FollowerConfig::default()
        };
        let mut fusion = TargetFusion::new(&config);
        let now = Instant::now();
        fusion.update(face_at(480.0, 240.0, 50.0), now);
        assert!(!fusion.signals(now, None).color_found);

        let est = fusion.update(
            Observation::Color(ColorObservation {
                present: true,
                center: Some(PixelPoint { x: 160.0, y: 240.0 }),
            }),
            now,
        );
        assert!(est.valid);
        assert_eq!(est.provenance, Provenance::Color);
        // (-0.25 + 0) / 2
        assert!((est.x + 0.125).abs() < 1e-6);
    }

    #[test]
    fn color_presence_without_geometry_keeps_track() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let now = Instant::now();
        fusion.update(face_at(480.0, 240.0, 50.0), now);
        let est = fusion.update(
            Observation::Color(ColorObservation {
                present: true,
                center: None,
            }),
            now,
        );
        assert!(est.valid);
        assert!((est.x - 0.125).abs() < 1e-6);
    }

    #[test]
    fn malformed_face_reads_as_not_found() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let est = fusion.update(face_at(f32::NAN, 240.0, 50.0), Instant::now());
        assert!(!est.valid);
        assert_eq!(est.x, 0.0);
    }

    #[test]
    fn out_of_frame_pixels_are_clamped() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let est = fusion.update(face_at(10_000.0, 240.0, 50.0), Instant::now());
        assert!((est.x - 0.25).abs() < 1e-6); // (0.5 + 0) / 2
    }

    #[test]
    fn depth_centroid_is_normalized_to_search_box() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        // Box x ∈ (-0.2, 0.2), y ∈ (0.1, 0.5); centroid at the box centre.
        let est = fusion.update(depth(120), Instant::now());
        assert_eq!(est.provenance, Provenance::Depth);
        assert!(est.valid);
        assert!(est.x.abs() < 1e-6);
        assert!(est.y.abs() < 1e-6);
        assert_eq!(fusion.state().point_count, 120);
    }

    #[test]
    fn empty_depth_is_invalid_but_records_count() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let est = fusion.update(Observation::Depth(DepthObservation::empty()), Instant::now());
        assert!(!est.valid);
        assert_eq!(fusion.state().nearest_z, UNBOUNDED_DEPTH);
    }

    #[test]
    fn blended_target_gated_by_point_count() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let now = Instant::now();
        fusion.update(face_at(480.0, 240.0, 50.0), now);

        fusion.update(depth(3999), now);
        assert!(fusion.blended_target(4000).valid);

        fusion.update(depth(4000), now);
        assert!(!fusion.blended_target(4000).valid);
    }

    #[test]
    fn stale_face_reads_as_absent() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let seen = Instant::now();
        fusion.update(face_at(320.0, 240.0, 150.0), seen);

        let later = seen + Duration::from_millis(1500);
        let snap = fusion.signals(later, Some(Duration::from_secs(1)));
        assert!(!snap.face_found);
        assert!(!snap.close_to_human);

        let snap = fusion.signals(later, None);
        assert!(snap.face_found);
        assert!(snap.close_to_human);
    }

    #[test]
    fn snapshot_obstacle_uses_exclusive_threshold() {
        let mut fusion = TargetFusion::new(&FollowerConfig::default());
        let now = Instant::now();
        fusion.update(depth(4000), now);
        assert!(!fusion.signals(now, None).obstacle(4000));
        fusion.update(depth(4001), now);
        assert!(fusion.signals(now, None).obstacle(4000));
    }
}
