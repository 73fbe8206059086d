//! Viewport-sized render targets of the compute pass.

use crate::backend::{GpuBackend, TargetKind};
use crate::error::{RaycastError, Result};
use crate::slot::ResourceSlot;

/// Color, normal and depth targets of one viewport size.
#[derive(Debug, Clone)]
pub struct TargetSet<T> {
    /// RGBA8 raycast output.
    pub color: T,
    /// RGBA32F surface normals (isosurface only).
    pub normal: T,
    /// R32F surface depth (isosurface only).
    pub depth: T,
    pub width: u32,
    pub height: u32,
}

/// Owns the [`TargetSet`] and recreates it when the viewport size changes.
pub struct RenderTargets<B: GpuBackend> {
    slot: ResourceSlot<(u32, u32), TargetSet<B::Texture>>,
}

impl<B: GpuBackend> Default for RenderTargets<B> {
    fn default() -> Self {
        Self {
            slot: ResourceSlot::new(),
        }
    }
}

impl<B: GpuBackend> RenderTargets<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&TargetSet<B::Texture>> {
        self.slot.get()
    }

    /// Size of the current target set.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.slot.key().copied()
    }

    /// Makes the targets match `width` x `height`.
    ///
    /// Returns `Ok(true)` when the targets were (re)created.
    pub fn ensure(&mut self, backend: &mut B, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 {
            return Err(RaycastError::InvalidViewport { width, height });
        }
        let recreated = self.slot.ensure_with((width, height), |_| {
            Ok::<_, RaycastError>(TargetSet {
                color: backend.create_target(TargetKind::Color, width, height)?,
                normal: backend.create_target(TargetKind::Normal, width, height)?,
                depth: backend.create_target(TargetKind::Depth, width, height)?,
                width,
                height,
            })
        })?;
        if recreated {
            log::debug!("render targets resized to {width}x{height}");
        }
        Ok(recreated)
    }

    /// Creates the per-frame offscreen framebuffer the chained renderer draws
    /// into. The snapshot is not cached; dropping it releases it.
    pub fn create_snapshot(&self, backend: &mut B, width: u32, height: u32) -> Result<B::Snapshot> {
        if width == 0 || height == 0 {
            return Err(RaycastError::InvalidViewport { width, height });
        }
        backend.create_snapshot(width, height)
    }

    pub fn release(&mut self) {
        self.slot.clear();
    }
}
