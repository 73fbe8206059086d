//! Volume placement and voxel spacing.

use glam::Vec3;

use crate::error::{RaycastError, Result};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Placement and sampling density of a cartesian grid.
///
/// Grid points sit on the box corners, so the spacing along an axis is
/// `extent / (resolution - 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGeometry {
    pub origin: Vec3,
    pub extents: Vec3,
    pub resolution: [u32; 3],
}

impl VolumeGeometry {
    #[must_use]
    pub fn new(origin: [f32; 3], extents: [f32; 3], resolution: [u32; 3]) -> Self {
        Self {
            origin: Vec3::from_array(origin),
            extents: Vec3::from_array(extents),
            resolution,
        }
    }

    /// World-space box covered by the grid: `origin .. origin + extents`.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.origin, self.origin + self.extents)
    }

    /// Half the grid spacing in normalized texture coordinates, per axis.
    ///
    /// An axis with a single grid point spans the whole box, so its half
    /// spacing is 0.5.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn half_voxel_size(&self) -> Vec3 {
        let half = |r: u32| {
            if r > 1 {
                1.0 / (2.0 * (r - 1) as f32)
            } else {
                0.5
            }
        };
        Vec3::new(
            half(self.resolution[0]),
            half(self.resolution[1]),
            half(self.resolution[2]),
        )
    }

    /// World-space grid spacing along the axis with the largest resolution.
    ///
    /// # Errors
    /// Returns [`RaycastError::DegenerateResolution`] when the largest
    /// resolution is below 2, where the spacing is undefined.
    #[allow(clippy::cast_precision_loss)]
    pub fn voxel_size(&self) -> Result<f32> {
        let max_resolution = self.resolution.iter().copied().max().unwrap_or(0);
        if max_resolution < 2 {
            return Err(RaycastError::DegenerateResolution(self.resolution));
        }
        Ok(self.extents.max_element() / (max_resolution - 1) as f32)
    }
}
