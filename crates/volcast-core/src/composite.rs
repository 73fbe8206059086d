//! Full-screen compositing of the raycast result into the host output.

use glam::Vec2;

use crate::backend::{BlendFunc, GpuBackend, RasterState, UniformValue};
use crate::error::Result;
use crate::guard::{BindingScope, RasterStateGuard};
use crate::mode::RenderMode;
use crate::range::ValueRange;
use crate::raycast::RaycastPrograms;
use crate::targets::TargetSet;

/// Vertices of the two full-screen triangles.
pub const FULLSCREEN_VERTEX_COUNT: u32 = 6;

/// Texture unit of the raycast color.
pub const SOURCE_UNIT: u32 = 0;
/// Texture unit of the isosurface normals, or of the transfer function in
/// Aggregate mode.
pub const SECONDARY_UNIT: u32 = 1;
/// Texture unit of the isosurface depth.
pub const DEPTH_UNIT: u32 = 2;

/// What the compositing pass reads.
pub struct CompositeInputs<'a, T> {
    pub mode: RenderMode,
    pub targets: &'a TargetSet<T>,
    pub transfer_function: Option<&'a T>,
    /// Aggregate range from the raycast readback.
    pub readback_range: Option<ValueRange>,
}

/// Blends the render targets over the host output.
pub struct Compositor;

impl Compositor {
    /// The raster state used while drawing `mode`.
    #[must_use]
    pub fn raster_state_for(mode: &RenderMode) -> RasterState {
        RasterState {
            blend_enabled: true,
            blend_func: BlendFunc::ALPHA,
            depth_test: mode.depth_tested(),
        }
    }

    /// Draws the raycast result. The host's raster state, texture bindings
    /// and draw buffers are exactly as before when this returns, whether it
    /// succeeds or not.
    pub fn composite<B: GpuBackend>(
        backend: &mut B,
        programs: &mut RaycastPrograms<B::Program>,
        inputs: &CompositeInputs<'_, B::Texture>,
    ) -> Result<()> {
        let mode = inputs.mode;
        let mut raster = RasterStateGuard::new(backend);
        raster.set_raster_state(Self::raster_state_for(&mode));

        let program = programs.composite_mut(&mode);
        if let RenderMode::Aggregate = mode {
            let range = inputs.readback_range.unwrap_or_default();
            raster.set_uniform(
                program,
                "val_range",
                UniformValue::Vec2(Vec2::from_array(range.to_array())),
            )?;
        }

        let targets = inputs.targets;
        let mut bindings = BindingScope::new(&mut *raster);
        bindings.texture(SOURCE_UNIT, &targets.color);
        match mode {
            RenderMode::Isosurface(_) => {
                bindings.texture(SECONDARY_UNIT, &targets.normal);
                bindings.texture(DEPTH_UNIT, &targets.depth);
                bindings.draw_buffers(2);
            }
            RenderMode::Aggregate => {
                if let Some(tf) = inputs.transfer_function {
                    bindings.texture(SECONDARY_UNIT, tf);
                }
            }
            RenderMode::Integration(_) => {}
        }
        bindings.draw(program, FULLSCREEN_VERTEX_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BlendFactor, ProgramId};
    use crate::mode::{IntegrationParams, IsosurfaceParams};
    use crate::test_helpers::{Command, RecordingBackend, RecordingProgram, TextureHandle};
    use proptest::prelude::*;

    fn targets() -> TargetSet<TextureHandle> {
        TargetSet {
            color: TextureHandle(10),
            normal: TextureHandle(11),
            depth: TextureHandle(12),
            width: 4,
            height: 4,
        }
    }

    fn modes() -> [RenderMode; 3] {
        [
            RenderMode::Integration(IntegrationParams {
                opacity_threshold: 1.0,
            }),
            RenderMode::Isosurface(IsosurfaceParams {
                iso_value: 0.5,
                opacity: 1.0,
            }),
            RenderMode::Aggregate,
        ]
    }

    fn composite(
        backend: &mut RecordingBackend,
        programs: &mut RaycastPrograms<RecordingProgram>,
        mode: RenderMode,
    ) -> Result<()> {
        let targets = targets();
        let tf = TextureHandle(20);
        let inputs = CompositeInputs {
            mode,
            targets: &targets,
            transfer_function: Some(&tf),
            readback_range: Some(ValueRange::new(0.2, 0.8)),
        };
        Compositor::composite(backend, programs, &inputs)
    }

    fn last_draw(backend: &RecordingBackend) -> Command {
        backend
            .commands
            .iter()
            .rev()
            .find(|c| matches!(c, Command::Draw { .. }))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_isosurface_depth_tested_dual_output() {
        let mut backend = RecordingBackend::new();
        let mut programs = RaycastPrograms::compile(&mut backend).unwrap();
        composite(&mut backend, &mut programs, modes()[1]).unwrap();

        let Command::Draw {
            program,
            vertex_count,
            state,
            draw_buffers,
        } = last_draw(&backend)
        else {
            unreachable!()
        };
        assert_eq!(program, ProgramId::Composite);
        assert_eq!(vertex_count, 6);
        assert!(state.depth_test);
        assert!(state.blend_enabled);
        assert_eq!(state.blend_func, BlendFunc::ALPHA);
        assert_eq!(draw_buffers, 2);
        assert_eq!(backend.draw_buffers(), 1);

        let observed = &backend.draws[0];
        assert_eq!(observed.textures[&SOURCE_UNIT], TextureHandle(10));
        assert_eq!(observed.textures[&SECONDARY_UNIT], TextureHandle(11));
        assert_eq!(observed.textures[&DEPTH_UNIT], TextureHandle(12));
    }

    #[test]
    fn test_integration_overlay() {
        let mut backend = RecordingBackend::new();
        let mut programs = RaycastPrograms::compile(&mut backend).unwrap();
        backend.set_raster_state(RasterState {
            depth_test: true,
            ..RasterState::default()
        });
        composite(&mut backend, &mut programs, modes()[0]).unwrap();

        let Command::Draw {
            program,
            state,
            draw_buffers,
            ..
        } = last_draw(&backend)
        else {
            unreachable!()
        };
        assert_eq!(program, ProgramId::Composite);
        assert!(!state.depth_test);
        assert_eq!(draw_buffers, 1);
        assert_eq!(backend.draws[0].textures.len(), 1);
        assert!(backend.uniforms_set(ProgramId::Composite).is_empty());
    }

    #[test]
    fn test_aggregate_maps_through_transfer_function() {
        let mut backend = RecordingBackend::new();
        let mut programs = RaycastPrograms::compile(&mut backend).unwrap();
        composite(&mut backend, &mut programs, modes()[2]).unwrap();

        let Command::Draw { program, state, .. } = last_draw(&backend) else {
            unreachable!()
        };
        assert_eq!(program, ProgramId::CompositeAggregate);
        assert!(!state.depth_test);
        assert_eq!(backend.draws[0].textures[&SECONDARY_UNIT], TextureHandle(20));
        assert_eq!(
            backend.uniform(ProgramId::CompositeAggregate, "val_range"),
            Some(UniformValue::Vec2(Vec2::new(0.2, 0.8)))
        );
    }

    fn factor_strategy() -> impl Strategy<Value = BlendFactor> {
        prop_oneof![
            Just(BlendFactor::Zero),
            Just(BlendFactor::One),
            Just(BlendFactor::SrcColor),
            Just(BlendFactor::OneMinusSrcColor),
            Just(BlendFactor::SrcAlpha),
            Just(BlendFactor::OneMinusSrcAlpha),
            Just(BlendFactor::DstColor),
            Just(BlendFactor::OneMinusDstColor),
            Just(BlendFactor::DstAlpha),
            Just(BlendFactor::OneMinusDstAlpha),
        ]
    }

    fn raster_strategy() -> impl Strategy<Value = RasterState> {
        (
            any::<bool>(),
            any::<bool>(),
            factor_strategy(),
            factor_strategy(),
            factor_strategy(),
            factor_strategy(),
        )
            .prop_map(|(blend_enabled, depth_test, a, b, c, d)| RasterState {
                blend_enabled,
                blend_func: BlendFunc {
                    src_rgb: a,
                    dst_rgb: b,
                    src_alpha: c,
                    dst_alpha: d,
                },
                depth_test,
            })
    }

    proptest! {
        #[test]
        fn prop_state_restored(initial in raster_strategy(), mode_index in 0usize..3, fail in any::<bool>()) {
            let mut backend = RecordingBackend::new();
            let mut programs = RaycastPrograms::compile(&mut backend).unwrap();
            backend.set_raster_state(initial);
            backend.fail_draw = fail;

            let result = composite(&mut backend, &mut programs, modes()[mode_index]);
            prop_assert_eq!(result.is_err(), fail);
            prop_assert_eq!(backend.raster_state(), initial);
            prop_assert!(backend.bound_textures().is_empty());
            prop_assert_eq!(backend.draw_buffers(), 1);
        }
    }
}
