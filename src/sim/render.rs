use crate::config::SimulationConfig;
use crate::error::RenderError;
use crate::math::Pose;
use crate::physics::BodyId;
use crate::sim::mesh::{Mesh, MeshKind};
use std::time::Duration;
use tracing::{debug, info};

/// A body the loop should draw.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub body: BodyId,
    pub label: String,
    pub mesh: MeshKind,
    /// Static scenery is uploaded once and never receives pose updates.
    pub scenery: bool,
    /// Wrap the drawn x coordinate into `[-w, w)`.
    pub wrap_x: Option<f32>,
}

impl RenderItem {
    pub fn new(body: BodyId, label: impl Into<String>, mesh: MeshKind) -> Self {
        Self {
            body,
            label: label.into(),
            mesh,
            scenery: false,
            wrap_x: None,
        }
    }

    pub fn scenery(mut self) -> Self {
        self.scenery = true;
        self
    }

    pub fn sample(&self, pose: &Pose) -> PoseSample {
        let mut sample = PoseSample::from_pose(self.body, pose);
        if let Some(w) = self.wrap_x {
            sample.position[0] = wrap(sample.position[0], w);
        }
        sample
    }
}

fn wrap(x: f32, half_width: f32) -> f32 {
    if half_width <= 0.0 {
        return x;
    }
    (x + half_width).rem_euclid(2.0 * half_width) - half_width
}

/// A body-frame axis, naming a column of `PoseSample::rotation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAxis {
    X = 0,
    Y = 1,
    Z = 2,
}

/// Pose of one body, ready to upload as shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub body: BodyId,
    pub position: [f32; 3],
    /// Column-major 3x3 rotation; columns are the local X, Y, Z axes.
    pub rotation: [f32; 9],
}

impl PoseSample {
    pub fn from_pose(body: BodyId, pose: &Pose) -> Self {
        let m = pose.rotation_matrix();
        let mut rotation = [0.0f32; 9];
        for (dst, src) in rotation.iter_mut().zip(m.as_slice()) {
            *dst = *src as f32;
        }
        Self {
            body,
            position: pose.position.to_f32_array(),
            rotation,
        }
    }

    pub fn axis(&self, axis: LocalAxis) -> [f32; 3] {
        let c = 3 * axis as usize;
        [self.rotation[c], self.rotation[c + 1], self.rotation[c + 2]]
    }
}

/// Everything drawn in one loop iteration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub index: u64,
    /// World time of the poses, before this frame's step.
    pub sim_time: f64,
    pub samples: Vec<PoseSample>,
}

/// Renderer as seen by the frame loop.
pub trait RenderBridge {
    /// Build the pipeline and upload static geometry. Called once, before the
    /// first frame; an error here aborts the run.
    fn prepare(&mut self, items: &[RenderItem]) -> Result<(), RenderError>;

    fn present(&mut self, frame: &Frame) -> Result<(), RenderError>;

    fn close_requested(&self) -> bool;
}

/// Offscreen renderer: validates geometry, keeps the last frame and closes
/// after a frame budget.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    max_frames: Option<u64>,
    frame_interval: Option<Duration>,
    meshes: Vec<Mesh>,
    presented: u64,
    last_frame: Option<Frame>,
    close: bool,
}

impl HeadlessRenderer {
    pub fn new(max_frames: Option<u64>) -> Self {
        Self {
            max_frames,
            ..Self::default()
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        let mut renderer = Self::new(config.max_frames);
        renderer.frame_interval = config
            .frame_interval
            .filter(|s| *s > 0.0)
            .map(Duration::from_secs_f64);
        renderer
    }

    /// Ask the loop to stop at its next close check.
    pub fn request_close(&mut self) {
        self.close = true;
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }
}

impl RenderBridge for HeadlessRenderer {
    fn prepare(&mut self, items: &[RenderItem]) -> Result<(), RenderError> {
        self.meshes = items
            .iter()
            .map(|item| Mesh::build(item.label.clone(), &item.mesh))
            .collect::<Result<_, _>>()?;
        let triangles: usize = self.meshes.iter().map(Mesh::triangle_count).sum();
        info!(meshes = self.meshes.len(), triangles, "headless renderer prepared");
        Ok(())
    }

    fn present(&mut self, frame: &Frame) -> Result<(), RenderError> {
        debug!(frame = frame.index, samples = frame.samples.len(), "frame presented");
        self.presented += 1;
        self.last_frame = Some(frame.clone());
        if let Some(interval) = self.frame_interval {
            std::thread::sleep(interval);
        }
        Ok(())
    }

    fn close_requested(&self) -> bool {
        self.close || self.max_frames.is_some_and(|max| self.presented >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, Vec3};
    use approx::assert_relative_eq;

    #[test]
    fn wrap_maps_into_symmetric_window() {
        assert_relative_eq!(wrap(0.5, 1.0), 0.5);
        assert_relative_eq!(wrap(1.5, 1.0), -0.5);
        assert_relative_eq!(wrap(-1.5, 1.0), 0.5);
        assert_relative_eq!(wrap(1.0, 1.0), -1.0);
        assert_relative_eq!(wrap(7.25, 1.0), -0.75);
    }

    #[test]
    fn sample_columns_are_local_axes() {
        let pose = Pose::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(&Vec3::unit_z(), std::f64::consts::FRAC_PI_2),
        );
        let sample = PoseSample::from_pose(BodyId(0), &pose);
        let x = sample.axis(LocalAxis::X);
        assert_relative_eq!(x[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
        let z = sample.axis(LocalAxis::Z);
        assert_relative_eq!(z[2], 1.0, epsilon = 1e-6);
        assert_eq!(sample.position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn headless_closes_after_budget() {
        let mut renderer = HeadlessRenderer::new(Some(2));
        assert!(!renderer.close_requested());
        renderer.present(&Frame::default()).unwrap();
        renderer.present(&Frame::default()).unwrap();
        assert!(renderer.close_requested());
    }
}
