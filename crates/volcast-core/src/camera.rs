//! Camera matrices fed to the raycaster.

use glam::{Mat4, Vec3};

use crate::geometry::BoundingBox;

/// View and projection matrices of the host camera.
///
/// Projections follow the wgpu clip-space convention (depth in `[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for CameraMatrices {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y)
    }
}

impl CameraMatrices {
    #[must_use]
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// A 45 degree perspective camera at `eye` looking at `target`, with a
    /// square aspect ratio.
    #[must_use]
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, up),
            projection: Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.01, 1000.0),
        }
    }

    /// Replaces the projection with a perspective one.
    #[must_use]
    pub fn with_perspective(mut self, fov_y: f32, aspect_ratio: f32, near: f32, far: f32) -> Self {
        self.projection = Mat4::perspective_rh(fov_y, aspect_ratio, near, far);
        self
    }

    /// Frames `bbox` from the +z side, the way a viewer resets its camera.
    #[must_use]
    pub fn framing(bbox: &BoundingBox, aspect_ratio: f32) -> Self {
        let center = bbox.center();
        let size = bbox.size().length().max(f32::EPSILON);
        let eye = center + Vec3::new(0.0, 0.0, size * 1.5);
        Self::look_at(eye, center, Vec3::Y).with_perspective(
            std::f32::consts::FRAC_PI_4,
            aspect_ratio,
            size * 0.001,
            size * 100.0,
        )
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// World-space camera position.
    #[must_use]
    pub fn eye(&self) -> Vec3 {
        self.view.inverse().w_axis.truncate()
    }
}
