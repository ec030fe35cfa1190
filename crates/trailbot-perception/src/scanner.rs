//! Depth Field Scanner.
//!
//! Projects every pixel of a depth image into camera-relative meters using
//! precomputed bearing tables and aggregates the points that fall inside the
//! configured [`SearchBox`] into a [`DepthObservation`].
//!
//! For a pixel `(u, v)` at depth `d`:
//!
//! ```text
//! x = sin((u - W/2) * H_FOV / W) * d
//! y = sin((H/2 - v) * V_FOV / H) * d      // up-positive
//! ```
//!
//! Rows use `V_FOV / H` by default.  Setting
//! [`CameraModel::row_pitch`] to [`RowPitch::Width`] divides by the image
//! width instead, which compresses the vertical spread to `H/W` of the true
//! field of view.  The same scene then yields different point counts, so
//! `obstacle_point_threshold` (4000) must be retuned when switching.
//!
//! The sine tables depend only on the frame geometry and the camera model,
//! so they are built once and reused until a frame of a different size
//! arrives.
//!
//! # Example
//!
//! ```rust
//! use trailbot_perception::scanner::DepthFieldScanner;
//! use trailbot_types::{DepthFrame, FollowerConfig};
//!
//! let mut scanner = DepthFieldScanner::default();
//! let frame = DepthFrame::from_meters(4, 4, vec![f32::NAN; 16]);
//! let obs = scanner.scan(&frame, &FollowerConfig::default().search_box());
//! assert_eq!(obs.point_count, 0);
//! assert!(obs.centroid.is_none());
//! ```

use tracing::debug;
use trailbot_types::{Centroid, DepthFrame, DepthObservation, DepthSamples, SearchBox, UNBOUNDED_DEPTH};

// ────────────────────────────────────────────────────────────────────────────
// Camera model
// ────────────────────────────────────────────────────────────────────────────

/// Field of view of the depth camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    /// Horizontal field of view (radians).
    pub horizontal_fov_rad: f32,
    /// Vertical field of view (radians).
    pub vertical_fov_rad: f32,
    pub row_pitch: RowPitch,
}

/// Pixel count the vertical field of view is spread over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowPitch {
    /// `V_FOV / height`: each row spans its true angle.
    #[default]
    Height,
    /// `V_FOV / width`: the legacy geometry the 4000-point obstacle
    /// threshold was first tuned on.
    Width,
}

impl Default for CameraModel {
    /// 60° × 45°, using the 57°/rad approximation.
    fn default() -> Self {
        Self {
            horizontal_fov_rad: 60.0 / 57.0,
            vertical_fov_rad: 45.0 / 57.0,
            row_pitch: RowPitch::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bearing tables
// ────────────────────────────────────────────────────────────────────────────

/// Per-column and per-row sines of the bearing angle for one frame size.
#[derive(Debug, Clone, PartialEq)]
pub struct BearingTables {
    width: u32,
    height: u32,
    sin_col: Vec<f32>,
    sin_row: Vec<f32>,
}

impl BearingTables {
    pub fn new(width: u32, height: u32, camera: &CameraModel) -> Self {
        let w = width as f32;
        let h = height as f32;
        let col_rad_per_px = if width > 0 { camera.horizontal_fov_rad / w } else { 0.0 };
        let row_px = match camera.row_pitch {
            RowPitch::Height => h,
            RowPitch::Width => w,
        };
        let row_rad_per_px = if row_px > 0.0 { camera.vertical_fov_rad / row_px } else { 0.0 };

        let sin_col = (0..width)
            .map(|u| ((u as f32 - w / 2.0) * col_rad_per_px).sin())
            .collect();
        // Sign opposite to the columns so increasing rows point down.
        let sin_row = (0..height)
            .map(|v| ((h / 2.0 - v as f32) * row_rad_per_px).sin())
            .collect();

        Self {
            width,
            height,
            sin_col,
            sin_row,
        }
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Project pixel `(u, v)` at `depth` meters into camera-relative `(x, y)`.
    pub fn project(&self, u: usize, v: usize, depth: f32) -> (f32, f32) {
        (self.sin_col[u] * depth, self.sin_row[v] * depth)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sample decoding
// ────────────────────────────────────────────────────────────────────────────

/// A raw depth sample that can be decoded to meters.
trait DepthSample: Copy {
    /// Meters, or `None` when the encoding marks the sample invalid.
    fn to_meters(self) -> Option<f32>;
}

impl DepthSample for f32 {
    fn to_meters(self) -> Option<f32> {
        self.is_finite().then_some(self)
    }
}

impl DepthSample for u16 {
    fn to_meters(self) -> Option<f32> {
        (self != 0).then(|| self as f32 * 0.001)
    }
}

#[derive(Default)]
struct Accumulator {
    sum_x: f64,
    sum_y: f64,
    nearest: f32,
    count: u32,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            nearest: UNBOUNDED_DEPTH,
            ..Self::default()
        }
    }

    fn finish(self) -> DepthObservation {
        if self.count == 0 {
            return DepthObservation::empty();
        }
        let n = self.count as f64;
        DepthObservation {
            centroid: Some(Centroid {
                x: (self.sum_x / n) as f32,
                y: (self.sum_y / n) as f32,
            }),
            nearest_z: self.nearest,
            point_count: self.count,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DepthFieldScanner
// ────────────────────────────────────────────────────────────────────────────

/// Converts depth frames into [`DepthObservation`]s.
///
/// Holds no state between frames other than the cached [`BearingTables`].
#[derive(Debug, Default)]
pub struct DepthFieldScanner {
    camera: CameraModel,
    tables: Option<BearingTables>,
}

impl DepthFieldScanner {
    pub fn new(camera: CameraModel) -> Self {
        Self {
            camera,
            tables: None,
        }
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// Return the cached tables for this geometry, rebuilding on a size change.
    pub fn tables_for(&mut self, width: u32, height: u32) -> &BearingTables {
        let camera = self.camera;
        if !self.tables.as_ref().is_some_and(|t| t.matches(width, height)) {
            debug!(width, height, "building bearing tables");
            self.tables = Some(BearingTables::new(width, height, &camera));
        }
        self.tables
            .get_or_insert_with(|| BearingTables::new(width, height, &camera))
    }

    /// Aggregate the points of `frame` that lie inside `search`.
    ///
    /// Invalid samples, samples beyond `max_z` and rows missing from a
    /// truncated buffer are skipped; the scan itself never fails.
    pub fn scan(&mut self, frame: &DepthFrame, search: &SearchBox) -> DepthObservation {
        let stride = frame.row_stride_samples();
        let (width, height) = (frame.width as usize, frame.height as usize);
        let tables = self.tables_for(frame.width, frame.height);

        let acc = match &frame.samples {
            DepthSamples::Meters(data) => accumulate(data, width, height, stride, tables, search),
            DepthSamples::Millimeters(data) => {
                accumulate(data, width, height, stride, tables, search)
            }
        };
        acc.finish()
    }
}

fn accumulate<T: DepthSample>(
    data: &[T],
    width: usize,
    height: usize,
    stride: usize,
    tables: &BearingTables,
    search: &SearchBox,
) -> Accumulator {
    let mut acc = Accumulator::new();
    for v in 0..height {
        let start = v * stride;
        let Some(row) = data.get(start..start + width) else {
            debug!(row = v, available = data.len(), "depth buffer truncated; skipping remaining rows");
            break;
        };
        for (u, sample) in row.iter().enumerate() {
            let Some(depth) = sample.to_meters() else {
                continue;
            };
            if depth > search.max_z {
                continue;
            }
            let (x, y) = tables.project(u, v, depth);
            if search.contains(x, y) {
                acc.sum_x += x as f64;
                acc.sum_y += y as f64;
                acc.nearest = acc.nearest.min(depth);
                acc.count += 1;
            }
        }
    }
    acc
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
