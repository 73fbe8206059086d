//! The upstream renderer whose output the raycast is composited with.

use crate::backend::GpuBackend;
use crate::error::Result;
use crate::renderer::{FrameRequest, SceneExtents};

/// Where a chained renderer draws this frame.
pub enum ChainTarget<'a, B: GpuBackend> {
    /// An offscreen color + depth framebuffer that the raycaster samples
    /// afterwards (Integration and Aggregate modes).
    Snapshot(&'a B::Snapshot),
    /// The host output, which the isosurface is then depth tested against.
    HostOutput,
}

impl<B: GpuBackend> ChainTarget<'_, B> {
    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }
}

/// A renderer running before the raycaster in the same frame.
pub trait ChainedRenderer<B: GpuBackend> {
    /// Bounds of the chained scene at `time`. The frame count is ignored.
    fn extents(&mut self, time: f32) -> Result<SceneExtents>;

    /// Draws the chained scene into `target` using the frame's camera.
    fn render(&mut self, backend: &mut B, target: ChainTarget<'_, B>, frame: &FrameRequest)
        -> Result<()>;
}
