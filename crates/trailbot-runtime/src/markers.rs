//! Diagnostic markers: the tracked target and the search box.

use trailbot_types::{
    FollowerConfig, Marker, MarkerShape, Rgba, TargetEstimate, UNBOUNDED_DEPTH,
};

pub const TARGET_MARKER_ID: u32 = 0;
pub const SEARCH_BOX_MARKER_ID: u32 = 1;

/// Red sphere at the target.  Without a depth return it sits at `max_z`.
pub fn target_marker(target: &TargetEstimate, nearest_z: f32, config: &FollowerConfig) -> Marker {
    let z = if nearest_z < UNBOUNDED_DEPTH { nearest_z } else { config.max_z };
    Marker {
        id: TARGET_MARKER_ID,
        shape: MarkerShape::Sphere,
        position: [target.x, target.y, z],
        scale: [0.2, 0.2, 0.2],
        color: Rgba {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        },
    }
}

/// Translucent green cube spanning the search box.
pub fn search_box_marker(config: &FollowerConfig) -> Marker {
    Marker {
        id: SEARCH_BOX_MARKER_ID,
        shape: MarkerShape::Cube,
        // Image y points down, the box is specified up-positive.
        position: [
            (config.min_x + config.max_x) / 2.0,
            -(config.min_y + config.max_y) / 2.0,
            config.max_z / 2.0,
        ],
        scale: [
            config.max_x - config.min_x,
            config.max_y - config.min_y,
            config.max_z,
        ],
        color: Rgba {
            r: 0.0,
            g: 1.0,
            b: 0.0,
            a: 0.5,
        },
    }
}

pub fn diagnostic_markers(
    target: Option<&TargetEstimate>,
    nearest_z: f32,
    config: &FollowerConfig,
) -> Vec<Marker> {
    let mut markers = Vec::with_capacity(2);
    if let Some(t) = target {
        markers.push(target_marker(t, nearest_z, config));
    }
    markers.push(search_box_marker(config));
    markers
}
