//! Simulated follow scene.
//!
//! [`SimSceneAdapter`] places a simulated robot (a [`SimDriveBase`]) behind a
//! person who wanders along a smooth closed path.  Every tick it renders what
//! the robot's camera would see:
//!
//! * **Depth** – a [`DepthFrame`] in which the person's body is a vertical
//!   slab and everything else is far wall.
//! * **Faces** – a [`FaceObservation`] in detector pixels, empty when the
//!   face is out of view.
//!
//! Commands received through [`FollowerAdapter::execute_command`] drive the
//! simulated base, closing the loop.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;
use trailbot_hal::drive::CommandSink;
use trailbot_hal::sim::SimDriveBase;
use trailbot_perception::scanner::{BearingTables, CameraModel};
use trailbot_types::{
    DepthFrame, FaceBox, FaceObservation, FollowError, Pose2D, SensorEvent, SensorPayload,
    VelocityCommand, rate_period,
};

use crate::adapter::FollowerAdapter;

/// Range reported where nothing but the far wall is visible (m).
const WALL_RANGE: f32 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    /// Depth frame size (px).
    pub depth_width: u32,
    pub depth_height: u32,
    /// Detector image size (px).
    pub detector_width: f32,
    pub detector_height: f32,
    pub rate_hz: f32,
    /// Half the person's body width (m).
    pub body_half_width: f32,
    /// Body extent above and below the optical axis (m).
    pub body_top: f32,
    pub body_bottom: f32,
    /// Face height above the optical axis (m).
    pub face_height: f32,
    pub face_size: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            depth_width: 320,
            depth_height: 240,
            detector_width: 640.0,
            detector_height: 480.0,
            rate_hz: 10.0,
            body_half_width: 0.2,
            body_top: 0.9,
            body_bottom: -0.3,
            face_height: 0.25,
            face_size: 0.16,
        }
    }
}

/// Where the person is, relative to the robot's camera (m).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeTarget {
    /// To the right of the optical axis.
    pub lateral: f32,
    /// Along the optical axis.
    pub forward: f32,
}

/// Adapter backed by an in-process simulation.
pub struct SimSceneAdapter {
    base: SimDriveBase,
    config: SceneConfig,
    tables: BearingTables,
    camera: CameraModel,
}

impl SimSceneAdapter {
    pub fn new(config: SceneConfig) -> Self {
        let camera = CameraModel::default();
        let tables = BearingTables::new(config.depth_width, config.depth_height, &camera);
        Self {
            base: SimDriveBase::new(),
            config,
            tables,
            camera,
        }
    }

    /// Handle onto the simulated base, for inspection.
    pub fn base(&self) -> &SimDriveBase {
        &self.base
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Person position in the world at `t` seconds.
    pub fn person_at(t: f32) -> Pose2D {
        Pose2D {
            x: 1.2 + 0.4 * (0.2 * t).sin() + 0.1 * t,
            y: 0.5 * (0.3 * t).sin(),
            yaw: 0.0,
        }
    }

    /// Express `person` in the camera frame of a robot at `robot`.
    pub fn relative(robot: Pose2D, person: Pose2D) -> RelativeTarget {
        let dx = person.x - robot.x;
        let dy = person.y - robot.y;
        let (sin, cos) = robot.yaw.sin_cos();
        RelativeTarget {
            lateral: dx * sin - dy * cos,
            forward: dx * cos + dy * sin,
        }
    }

    /// Depth frame seen with the person at `target`.
    pub fn render_depth(&self, target: RelativeTarget) -> DepthFrame {
        let (w, h) = (self.config.depth_width, self.config.depth_height);
        let mut samples = vec![WALL_RANGE; (w * h) as usize];
        let d = target.forward;
        if d > 0.0 {
            for v in 0..h as usize {
                for u in 0..w as usize {
                    let (x, y) = self.tables.project(u, v, d);
                    let on_body = (x - target.lateral).abs() < self.config.body_half_width
                        && y > self.config.body_bottom
                        && y < self.config.body_top;
                    if on_body {
                        samples[v * w as usize + u] = d;
                    }
                }
            }
        }
        DepthFrame::from_meters(w, h, samples)
    }

    /// Face detector output with the person at `target`.
    pub fn render_faces(&self, target: RelativeTarget) -> FaceObservation {
        let d = target.forward;
        if d <= 0.1 {
            return FaceObservation::default();
        }
        let (dw, dh) = (self.config.detector_width, self.config.detector_height);
        let hfov = self.camera.horizontal_fov_rad;
        let vfov = self.camera.vertical_fov_rad;

        let col_angle = (target.lateral / d).clamp(-1.0, 1.0).asin();
        let row_angle = (self.config.face_height / d).clamp(-1.0, 1.0).asin();
        let center_x = col_angle * dw / hfov + dw / 2.0;
        let center_y = dh / 2.0 - row_angle * dh / vfov;
        if !(0.0..dw).contains(&center_x) || !(0.0..dh).contains(&center_y) {
            return FaceObservation::default();
        }
        let size = (self.config.face_size / d) * dw / hfov;
        FaceObservation {
            faces: vec![FaceBox {
                center_x,
                center_y,
                width: size,
                height: size,
            }],
        }
    }

    /// Advance the base by `dt` and render both sensors at scene time `t`.
    pub fn step(&self, t: f32, dt: Duration) -> [SensorEvent; 2] {
        self.base.advance(dt);
        let target = Self::relative(self.base.pose(), Self::person_at(t));
        debug!(t, lateral = target.lateral, forward = target.forward, "sim step");
        [
            SensorEvent::new("sim/camera/depth", SensorPayload::Depth(self.render_depth(target))),
            SensorEvent::new("sim/person_detection/faces", SensorPayload::Faces(self.render_faces(target))),
        ]
    }
}

impl Default for SimSceneAdapter {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl Clone for SimSceneAdapter {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            config: self.config.clone(),
            tables: self.tables.clone(),
            camera: self.camera,
        }
    }
}

#[async_trait]
impl FollowerAdapter for SimSceneAdapter {
    async fn execute_command(&self, cmd: VelocityCommand) -> Result<(), FollowError> {
        self.base.clone().publish(cmd)
    }

    /// Endless stream of depth and face events at `rate_hz`.
    async fn sensor_stream(&self) -> BoxStream<'static, SensorEvent> {
        let scene = self.clone();
        let dt = rate_period(scene.config.rate_hz);
        let mut ticker = interval(dt);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        stream::unfold((scene, ticker, 0.0f32), move |(scene, mut ticker, t)| async move {
            ticker.tick().await;
            let events = scene.step(t, dt);
            Some((stream::iter(events), (scene, ticker, t + dt.as_secs_f32())))
        })
        .flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailbot_perception::scanner::DepthFieldScanner;
    use trailbot_types::FollowerConfig;

    fn ahead(forward: f32, lateral: f32) -> RelativeTarget {
        RelativeTarget { lateral, forward }
    }

    #[test]
    fn relative_pose_in_camera_frame() {
        let robot = Pose2D::default();
        let left = Pose2D { x: 1.0, y: 0.5, yaw: 0.0 };
        let rel = SimSceneAdapter::relative(robot, left);
        assert!((rel.forward - 1.0).abs() < 1e-6);
        assert!((rel.lateral + 0.5).abs() < 1e-6, "left of the robot is negative lateral");

        let turned = Pose2D { x: 0.0, y: 0.0, yaw: std::f32::consts::FRAC_PI_2 };
        let rel = SimSceneAdapter::relative(turned, Pose2D { x: 0.0, y: 1.0, yaw: 0.0 });
        assert!((rel.forward - 1.0).abs() < 1e-5);
        assert!(rel.lateral.abs() < 1e-5);
    }

    #[test]
    fn close_person_fills_search_box() {
        let scene = SimSceneAdapter::default();
        let frame = scene.render_depth(ahead(0.6, 0.0));
        let obs = DepthFieldScanner::default().scan(&frame, &FollowerConfig::default().search_box());
        assert!(obs.point_count > 0);
        assert!((obs.nearest_z - 0.6).abs() < 1e-6);
        assert!(obs.centroid.unwrap().x.abs() < 0.05);
    }

    #[test]
    fn distant_person_is_beyond_max_z() {
        let scene = SimSceneAdapter::default();
        let frame = scene.render_depth(ahead(2.0, 0.0));
        let obs = DepthFieldScanner::default().scan(&frame, &FollowerConfig::default().search_box());
        assert_eq!(obs.point_count, 0);
    }

    #[test]
    fn face_right_of_axis_lands_right_of_centre() {
        let scene = SimSceneAdapter::default();
        let faces = scene.render_faces(ahead(1.5, 0.3));
        let face = faces.primary().expect("face in view");
        assert!(face.center_x > 320.0);
        assert!(face.center_y < 240.0, "face is above the optical axis");
    }

    #[test]
    fn face_width_grows_when_close() {
        let scene = SimSceneAdapter::default();
        let far = scene.render_faces(ahead(2.0, 0.0)).faces[0].width;
        let near = scene.render_faces(ahead(0.5, 0.0)).faces.first().map(|f| f.width);
        assert!(far < 100.0);
        // Very close the face may leave the top of the frame.
        if let Some(near) = near {
            assert!(near > far);
        }
    }

    #[test]
    fn person_behind_robot_is_invisible() {
        let scene = SimSceneAdapter::default();
        assert!(scene.render_faces(ahead(-1.0, 0.0)).faces.is_empty());
        let frame = scene.render_depth(ahead(-1.0, 0.0));
        let obs = DepthFieldScanner::default().scan(&frame, &FollowerConfig::default().search_box());
        assert!(obs.is_empty());
    }

    #[tokio::test]
    async fn commands_drive_the_simulated_base() {
        let scene = SimSceneAdapter::default();
        scene.execute_command(VelocityCommand::new(1.0, 0.0)).await.unwrap();
        scene.step(0.0, Duration::from_millis(500));
        assert!((scene.base().pose().x - 0.5).abs() < 1e-5);
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_stream_alternates_depth_and_faces() {
        let scene = SimSceneAdapter::default();
        let events: Vec<SensorEvent> = scene.sensor_stream().await.take(4).collect().await;
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0].payload, SensorPayload::Depth(_)));
        assert!(matches!(events[1].payload, SensorPayload::Faces(_)));
        assert!(matches!(events[2].payload, SensorPayload::Depth(_)));
    }
}
