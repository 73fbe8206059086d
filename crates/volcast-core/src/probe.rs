//! CPU sampling of volume data, matching the GPU raycaster's conventions.
//!
//! Useful for picking and for checking rendered isosurfaces.

use glam::Vec3;

use crate::error::{RaycastError, Result};
use crate::geometry::VolumeGeometry;
use crate::metadata::{checked_voxel_count, VolumeFormat, VolumeMetadata};

/// Bisection steps used to refine a crossing found by marching.
const REFINE_STEPS: u32 = 24;

/// Trilinear sampler over a volume held in memory.
#[derive(Debug, Clone)]
pub struct VolumeProbe {
    geometry: VolumeGeometry,
    values: Vec<f32>,
}

impl VolumeProbe {
    /// Wraps decoded scalars, x fastest.
    pub fn new(geometry: VolumeGeometry, values: Vec<f32>) -> Result<Self> {
        let expected = checked_voxel_count(geometry.resolution)
            .ok_or(RaycastError::DegenerateResolution(geometry.resolution))?;
        if values.len() != expected {
            return Err(RaycastError::DataSizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { geometry, values })
    }

    /// Decodes raw voxel bytes as delivered by a volume source.
    pub fn from_raw(metadata: &VolumeMetadata, data: &[u8]) -> Result<Self> {
        let format = metadata.validate()?;
        metadata.check_data_len(data.len())?;
        let values = match format {
            VolumeFormat::R32Float => data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            VolumeFormat::R8Uint => data.iter().map(|&v| f32::from(v)).collect(),
            VolumeFormat::R16Uint => data
                .chunks_exact(2)
                .map(|b| f32::from(u16::from_le_bytes([b[0], b[1]])))
                .collect(),
            VolumeFormat::R16Sint => data
                .chunks_exact(2)
                .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])))
                .collect(),
        };
        Self::new(metadata.geometry(), values)
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    fn voxel(&self, x: usize, y: usize, z: usize) -> f32 {
        let [rx, ry, _] = self.geometry.resolution;
        self.values[x + rx as usize * (y + ry as usize * z)]
    }

    /// Trilinearly interpolated value at world position `p`, or `None`
    /// outside the volume box.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn sample(&self, p: Vec3) -> Option<f32> {
        let bbox = self.geometry.bounding_box();
        let eps = 1e-5;
        if p.cmplt(bbox.min - eps).any() || p.cmpgt(bbox.max + eps).any() {
            return None;
        }
        let extents = self.geometry.extents.max(Vec3::splat(f32::EPSILON));
        let t = ((p - self.geometry.origin) / extents).clamp(Vec3::ZERO, Vec3::ONE);

        let mut base = [0usize; 3];
        let mut frac = [0f32; 3];
        for axis in 0..3 {
            let last = self.geometry.resolution[axis].saturating_sub(1);
            let coord = t[axis] * last as f32;
            let i = (coord.floor() as u32).min(last.saturating_sub(1));
            base[axis] = i as usize;
            frac[axis] = if last == 0 { 0.0 } else { coord - i as f32 };
        }
        let step = |axis: usize| usize::from(self.geometry.resolution[axis] > 1);
        let [x0, y0, z0] = base;
        let (x1, y1, z1) = (x0 + step(0), y0 + step(1), z0 + step(2));
        let [fx, fy, fz] = frac;

        let lerp = |a: f32, b: f32, f: f32| a + (b - a) * f;
        let c00 = lerp(self.voxel(x0, y0, z0), self.voxel(x1, y0, z0), fx);
        let c10 = lerp(self.voxel(x0, y1, z0), self.voxel(x1, y1, z0), fx);
        let c01 = lerp(self.voxel(x0, y0, z1), self.voxel(x1, y0, z1), fx);
        let c11 = lerp(self.voxel(x0, y1, z1), self.voxel(x1, y1, z1), fx);
        Some(lerp(lerp(c00, c10, fy), lerp(c01, c11, fy), fz))
    }

    /// Parametric entry and exit distances of a ray through the volume box.
    pub fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<(f32, f32)> {
        let bbox = self.geometry.bounding_box();
        let inv = direction.recip();
        let t0 = (bbox.min - origin) * inv;
        let t1 = (bbox.max - origin) * inv;
        let near = t0.min(t1);
        let far = t0.max(t1);
        // NaN from 0 * inf on axis-parallel rays is ignored by max/min_element
        let t_near = near.max_element().max(0.0);
        let t_far = far.min_element();
        (t_near <= t_far).then_some((t_near, t_far))
    }

    /// First point along the ray where the field crosses `iso_value`,
    /// marching in steps of `step` world units and refining by bisection.
    pub fn first_crossing(
        &self,
        origin: Vec3,
        direction: Vec3,
        iso_value: f32,
        step: f32,
    ) -> Option<Vec3> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO || step <= 0.0 {
            return None;
        }
        let (t_near, t_far) = self.intersect(origin, direction)?;
        let at = |t: f32| origin + direction * t;

        let mut t_prev = t_near;
        let mut prev = self.sample(at(t_prev))? - iso_value;
        if prev == 0.0 {
            return Some(at(t_prev));
        }
        let mut t = t_near;
        while t < t_far {
            t = (t + step).min(t_far);
            let current = self.sample(at(t))? - iso_value;
            if current == 0.0 || current.signum() != prev.signum() {
                let (mut lo, mut hi) = (t_prev, t);
                for _ in 0..REFINE_STEPS {
                    let mid = 0.5 * (lo + hi);
                    let value = self.sample(at(mid))? - iso_value;
                    if value.signum() == prev.signum() && value != 0.0 {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                return Some(at(0.5 * (lo + hi)));
            }
            t_prev = t;
            prev = current;
        }
        None
    }
}
