//! The mode-dispatched raycast compute pass.

use glam::{Vec2, Vec3, Vec4};

use crate::backend::{GpuBackend, ProgramId, UniformValue};
use crate::camera::CameraMatrices;
use crate::error::Result;
use crate::guard::BindingScope;
use crate::mode::RenderMode;
use crate::options::RaycastOptions;
use crate::range::ValueRange;
use crate::targets::TargetSet;
use crate::volume::UploadedVolume;

/// Edge length of the square compute workgroup.
pub const WORKGROUP_SIZE: u32 = 8;

/// Texture unit of the volume.
pub const VOLUME_UNIT: u32 = 0;
/// Texture unit of the transfer function.
pub const TRANSFER_FUNCTION_UNIT: u32 = 1;
/// Texture unit of the chained renderer's color.
pub const SNAPSHOT_COLOR_UNIT: u32 = 2;
/// Texture unit of the chained renderer's depth.
pub const SNAPSHOT_DEPTH_UNIT: u32 = 3;

pub const COLOR_IMAGE_SLOT: u32 = 0;
pub const NORMAL_IMAGE_SLOT: u32 = 1;
pub const DEPTH_IMAGE_SLOT: u32 = 2;

/// Workgroups covering a `width` x `height` target.
#[must_use]
pub fn workgroup_count(width: u32, height: u32) -> [u32; 3] {
    [
        width.div_ceil(WORKGROUP_SIZE),
        height.div_ceil(WORKGROUP_SIZE),
        1,
    ]
}

/// The five programs of the pipeline.
#[derive(Debug)]
pub struct RaycastPrograms<P> {
    pub integration: P,
    pub isosurface: P,
    pub aggregate: P,
    pub composite: P,
    pub composite_aggregate: P,
}

impl<P> RaycastPrograms<P> {
    /// Compiles every program. The first failure aborts.
    pub fn compile<B: GpuBackend<Program = P>>(backend: &mut B) -> Result<Self> {
        let mut compile = |id: ProgramId| {
            backend.compile_program(id).map_err(|e| {
                log::error!("unable to build program {}: {e}", id.source_name());
                e
            })
        };
        Ok(Self {
            integration: compile(ProgramId::RaycastIntegration)?,
            isosurface: compile(ProgramId::RaycastIsosurface)?,
            aggregate: compile(ProgramId::RaycastAggregate)?,
            composite: compile(ProgramId::Composite)?,
            composite_aggregate: compile(ProgramId::CompositeAggregate)?,
        })
    }

    /// The compute program of `mode`.
    pub fn compute_mut(&mut self, mode: &RenderMode) -> &mut P {
        match mode {
            RenderMode::Integration(_) => &mut self.integration,
            RenderMode::Isosurface(_) => &mut self.isosurface,
            RenderMode::Aggregate => &mut self.aggregate,
        }
    }

    /// The compositing program of `mode`.
    pub fn composite_mut(&mut self, mode: &RenderMode) -> &mut P {
        match mode {
            RenderMode::Aggregate => &mut self.composite_aggregate,
            RenderMode::Integration(_) | RenderMode::Isosurface(_) => &mut self.composite,
        }
    }
}

/// Color and depth of the chained renderer's output for this frame.
#[derive(Debug, Clone, Copy)]
pub struct ChainSnapshot<'a, T> {
    pub color: &'a T,
    pub depth: &'a T,
}

/// Everything a raycast pass reads.
pub struct RaycastInputs<'a, T> {
    pub mode: RenderMode,
    pub camera: CameraMatrices,
    pub volume: &'a UploadedVolume<T>,
    pub targets: &'a TargetSet<T>,
    pub transfer_function: Option<&'a T>,
    pub snapshot: Option<ChainSnapshot<'a, T>>,
    pub options: &'a RaycastOptions,
    /// World-space light position.
    pub light_position: Vec3,
    pub background: Vec4,
}

/// Result of a raycast pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RaycastOutcome {
    /// Observed aggregate range, read back in Aggregate mode only.
    pub readback_range: Option<ValueRange>,
}

/// Runs the compute pass of the selected mode.
pub struct RaycastEngine;

impl RaycastEngine {
    /// Sets uniforms, binds inputs and outputs, dispatches over the target
    /// and, in Aggregate mode, reads the target back to find the range of
    /// aggregated values.
    ///
    /// Every texture and image binding made here is cleared again before
    /// returning, also when the dispatch fails.
    pub fn raycast<B: GpuBackend>(
        backend: &mut B,
        programs: &mut RaycastPrograms<B::Program>,
        inputs: &RaycastInputs<'_, B::Texture>,
    ) -> Result<RaycastOutcome> {
        let mode = inputs.mode;
        let program = programs.compute_mut(&mode);
        set_shared_uniforms(backend, program, inputs)?;
        set_mode_uniforms(backend, program, inputs)?;

        let targets = inputs.targets;
        {
            let mut bindings = BindingScope::new(&mut *backend);
            bindings.texture(VOLUME_UNIT, &inputs.volume.texture);
            if mode.uses_transfer_function() {
                if let Some(tf) = inputs.transfer_function {
                    bindings.texture(TRANSFER_FUNCTION_UNIT, tf);
                }
                if let Some(snapshot) = &inputs.snapshot {
                    bindings.texture(SNAPSHOT_COLOR_UNIT, snapshot.color);
                    bindings.texture(SNAPSHOT_DEPTH_UNIT, snapshot.depth);
                }
            }

            bindings.image(COLOR_IMAGE_SLOT, &targets.color);
            if let RenderMode::Isosurface(_) = mode {
                bindings.image(NORMAL_IMAGE_SLOT, &targets.normal);
                bindings.image(DEPTH_IMAGE_SLOT, &targets.depth);
            }

            bindings.dispatch(program, workgroup_count(targets.width, targets.height))?;
        }
        backend.memory_barrier();

        let readback_range = match mode {
            RenderMode::Aggregate => {
                // full synchronous readback; this is the slow path of the pipeline
                let texels = backend.read_rgba(&targets.color)?;
                let range = ValueRange::of_alpha(&texels).unwrap_or_default();
                log::trace!("aggregate range {:?}", range.to_array());
                Some(range)
            }
            RenderMode::Integration(_) | RenderMode::Isosurface(_) => None,
        };
        Ok(RaycastOutcome { readback_range })
    }
}

fn set_shared_uniforms<B: GpuBackend>(
    backend: &mut B,
    program: &mut B::Program,
    inputs: &RaycastInputs<'_, B::Texture>,
) -> Result<()> {
    let geometry = &inputs.volume.geometry;
    let bbox = geometry.bounding_box();
    let voxel_size = geometry.voxel_size()?;
    let options = inputs.options;
    let lighting = &options.lighting;
    let camera = &inputs.camera;
    #[allow(clippy::cast_precision_loss)]
    let rt_resolution = Vec2::new(inputs.targets.width as f32, inputs.targets.height as f32);
    let value_range = options.value_range(inputs.volume.value_range);

    let uniforms = [
        ("view_mx", UniformValue::Mat4(camera.view)),
        ("proj_mx", UniformValue::Mat4(camera.projection)),
        ("inv_view_mx", UniformValue::Mat4(camera.view.inverse())),
        ("inv_proj_mx", UniformValue::Mat4(camera.projection.inverse())),
        ("rt_resolution", UniformValue::Vec2(rt_resolution)),
        ("box_min", UniformValue::Vec3(bbox.min)),
        ("box_max", UniformValue::Vec3(bbox.max)),
        ("half_voxel_size", UniformValue::Vec3(geometry.half_voxel_size())),
        ("voxel_size", UniformValue::F32(voxel_size)),
        ("val_range", UniformValue::Vec2(Vec2::from_array(value_range.to_array()))),
        ("ray_step_ratio", UniformValue::F32(options.ray_step_ratio)),
        ("use_lighting", UniformValue::Bool(lighting.enabled)),
        ("ka", UniformValue::F32(lighting.ka)),
        ("kd", UniformValue::F32(lighting.kd)),
        ("ks", UniformValue::F32(lighting.ks)),
        ("shininess", UniformValue::F32(lighting.shininess)),
        ("light", UniformValue::Vec3(inputs.light_position)),
        ("ambient_col", UniformValue::Vec4(lighting.ambient_color)),
        ("specular_col", UniformValue::Vec4(lighting.specular_color)),
        ("light_col", UniformValue::Vec4(lighting.light_color)),
        ("material_col", UniformValue::Vec4(lighting.material_color)),
        ("background", UniformValue::Vec4(inputs.background)),
    ];
    for (name, value) in uniforms {
        backend.set_uniform(program, name, value)?;
    }
    Ok(())
}

fn set_mode_uniforms<B: GpuBackend>(
    backend: &mut B,
    program: &mut B::Program,
    inputs: &RaycastInputs<'_, B::Texture>,
) -> Result<()> {
    let use_depth_tx = UniformValue::Bool(inputs.snapshot.is_some());
    match inputs.mode {
        RenderMode::Integration(params) => {
            backend.set_uniform(
                program,
                "opacity_threshold",
                UniformValue::F32(params.opacity_threshold),
            )?;
            backend.set_uniform(program, "use_depth_tx", use_depth_tx)
        }
        RenderMode::Isosurface(params) => {
            backend.set_uniform(program, "iso_value", UniformValue::F32(params.iso_value))?;
            backend.set_uniform(program, "opacity", UniformValue::F32(params.opacity))
        }
        RenderMode::Aggregate => backend.set_uniform(program, "use_depth_tx", use_depth_tx),
    }
}
