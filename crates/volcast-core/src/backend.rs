//! The GPU command interface the raycasting pipeline is written against.
//!
//! The pipeline issues immediate-mode commands (bind a texture to a unit, set
//! a named uniform, dispatch, draw) on a single logical command stream.
//! `volcast-render` implements this over wgpu.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::Result;
use crate::metadata::VolumeFormat;

/// Programs compiled when the renderer is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramId {
    /// Front-to-back compositing compute program.
    RaycastIntegration,
    /// First-hit surface compute program.
    RaycastIsosurface,
    /// Per-ray aggregation compute program.
    RaycastAggregate,
    /// Full-screen compositing of the color (and isosurface normal/depth) targets.
    Composite,
    /// Full-screen compositing mapping aggregates through the transfer function.
    CompositeAggregate,
}

impl ProgramId {
    pub const ALL: [ProgramId; 5] = [
        Self::RaycastIntegration,
        Self::RaycastIsosurface,
        Self::RaycastAggregate,
        Self::Composite,
        Self::CompositeAggregate,
    ];

    /// Name of the shader source this program is built from.
    #[must_use]
    pub fn source_name(self) -> &'static str {
        match self {
            Self::RaycastIntegration => "raycast::compute",
            Self::RaycastIsosurface => "raycast::compute_iso",
            Self::RaycastAggregate => "raycast::compute_aggr",
            Self::Composite => "raycast::composite",
            Self::CompositeAggregate => "raycast::composite_aggr",
        }
    }

    #[must_use]
    pub fn is_compute(self) -> bool {
        matches!(
            self,
            Self::RaycastIntegration | Self::RaycastIsosurface | Self::RaycastAggregate
        )
    }
}

/// A value written to a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    F32(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// Render target textures written by the compute pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// RGBA8 color.
    Color,
    /// RGBA32F surface normals.
    Normal,
    /// R32F surface depth.
    Depth,
}

/// Blend factors of the host's blend function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Separate RGB / alpha blend function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl BlendFunc {
    /// `(One, Zero)` for both channels, the initial state of a fresh context.
    pub const REPLACE: BlendFunc = BlendFunc::uniform(BlendFactor::One, BlendFactor::Zero);
    /// Standard non-premultiplied alpha blending.
    pub const ALPHA: BlendFunc =
        BlendFunc::uniform(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);

    /// Same factors for color and alpha.
    #[must_use]
    pub const fn uniform(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src_rgb: src,
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
        }
    }
}

impl Default for BlendFunc {
    fn default() -> Self {
        Self::REPLACE
    }
}

/// Raster state shared with the host render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterState {
    pub blend_enabled: bool,
    pub blend_func: BlendFunc,
    pub depth_test: bool,
}

/// Immediate-mode GPU interface.
///
/// Handles are owned values: dropping a texture or snapshot releases it.
pub trait GpuBackend {
    /// A compiled program together with its uniform storage.
    type Program;
    /// A 1D, 2D or 3D texture.
    type Texture: Clone;
    /// An offscreen color + depth framebuffer.
    type Snapshot;

    /// Compiles and links the program named by `id`.
    fn compile_program(&mut self, id: ProgramId) -> Result<Self::Program>;

    /// Creates a 3D texture and uploads `data` into it.
    fn create_volume_texture(
        &mut self,
        format: VolumeFormat,
        resolution: [u32; 3],
        data: &[u8],
    ) -> Result<Self::Texture>;

    /// Creates an uninitialized render target of the given kind.
    fn create_target(&mut self, kind: TargetKind, width: u32, height: u32)
        -> Result<Self::Texture>;

    /// Creates a 1D RGBA8 lookup texture.
    fn create_lookup_texture(&mut self, texels: &[[u8; 4]]) -> Result<Self::Texture>;

    /// Creates a cleared offscreen framebuffer (transparent color, far depth).
    fn create_snapshot(&mut self, width: u32, height: u32) -> Result<Self::Snapshot>;

    fn snapshot_color(&self, snapshot: &Self::Snapshot) -> Self::Texture;

    fn snapshot_depth(&self, snapshot: &Self::Snapshot) -> Self::Texture;

    /// Sets a named uniform of `program`.
    ///
    /// # Errors
    /// [`crate::RaycastError::MissingShaderParameter`] when the program does
    /// not declare `name`.
    fn set_uniform(
        &mut self,
        program: &mut Self::Program,
        name: &str,
        value: UniformValue,
    ) -> Result<()>;

    /// Binds a texture for sampling on `unit`, or clears the unit.
    fn bind_texture(&mut self, unit: u32, texture: Option<&Self::Texture>);

    /// Binds a write-only image on `slot`, or clears the slot.
    fn bind_image(&mut self, slot: u32, texture: Option<&Self::Texture>);

    /// Runs a compute program over `groups` workgroups.
    fn dispatch(&mut self, program: &Self::Program, groups: [u32; 3]) -> Result<()>;

    /// Makes image writes visible to later texture fetches.
    fn memory_barrier(&mut self);

    /// Reads a color or normal target back as tightly packed RGBA floats.
    /// Blocks until the GPU has finished all work writing the texture.
    fn read_rgba(&mut self, texture: &Self::Texture) -> Result<Vec<f32>>;

    fn raster_state(&self) -> RasterState;

    fn set_raster_state(&mut self, state: RasterState);

    /// Number of color attachments fragment programs write to.
    fn set_draw_buffers(&mut self, count: u32);

    /// Draws `vertex_count` vertices of a full-screen triangle list into the
    /// host output with the current raster state.
    fn draw_fullscreen(&mut self, program: &Self::Program, vertex_count: u32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_sources_unique() {
        let mut names: Vec<_> = ProgramId::ALL.iter().map(|p| p.source_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ProgramId::ALL.len());
    }

    #[test]
    fn test_raster_state_default() {
        let state = RasterState::default();
        assert!(!state.blend_enabled);
        assert!(!state.depth_test);
        assert_eq!(state.blend_func, BlendFunc::REPLACE);
    }
}
