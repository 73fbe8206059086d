//! A minimal chained renderer: a flat color at a fixed depth.

use glam::Vec4;

use volcast_core::{
    BoundingBox, ChainTarget, ChainedRenderer, FrameRequest, Result, SceneExtents,
};

use crate::engine::WgpuBackend;

/// Fills the chain target with one color and one depth value, and reports
/// fixed scene bounds.
///
/// Useful as the upstream scene of a raycast: a depth below 1.0 occludes
/// everything behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backdrop {
    pub color: Vec4,
    pub depth: f32,
    pub bounds: BoundingBox,
}

impl Backdrop {
    #[must_use]
    pub fn new(color: Vec4, depth: f32, bounds: BoundingBox) -> Self {
        Self {
            color,
            depth,
            bounds,
        }
    }
}

impl ChainedRenderer<WgpuBackend> for Backdrop {
    fn extents(&mut self, _time: f32) -> Result<SceneExtents> {
        Ok(SceneExtents {
            bounding_box: self.bounds,
            clip_box: self.bounds,
            frame_count: 1,
        })
    }

    fn render(
        &mut self,
        backend: &mut WgpuBackend,
        target: ChainTarget<'_, WgpuBackend>,
        _frame: &FrameRequest,
    ) -> Result<()> {
        log::trace!(
            "backdrop into {}",
            if target.is_snapshot() { "snapshot" } else { "output" }
        );
        backend.clear_chain_target(&target, self.color, self.depth)?;
        Ok(())
    }
}
