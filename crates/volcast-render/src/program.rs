//! Compiled programs, their binding tables and pipelines.
//!
//! A program's bindings are fixed per [`ProgramId`]. Texture units and image
//! slots from the immediate-mode binding table map onto `@group(0)` entries
//! through [`bindings`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU64;

use wgpu::util::DeviceExt;

use volcast_core::composite::{DEPTH_UNIT, SECONDARY_UNIT, SOURCE_UNIT};
use volcast_core::raycast::{
    COLOR_IMAGE_SLOT, DEPTH_IMAGE_SLOT, NORMAL_IMAGE_SLOT, SNAPSHOT_COLOR_UNIT,
    SNAPSHOT_DEPTH_UNIT, TRANSFER_FUNCTION_UNIT, VOLUME_UNIT,
};
use volcast_core::{BlendFactor, ProgramId, RasterState, SampleKind, UniformValue};

use crate::error::{with_error_scopes, RenderError, RenderResult, ScopedError};
use crate::shader::ShaderBuilder;
use crate::textures::{DEPTH_FORMAT, OUTPUT_COLOR_FORMAT, OUTPUT_NORMAL_FORMAT};
use crate::uniforms::{UniformBlock, UniformLayout};

/// What a texture binding expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    /// 3D volume; the sample type follows the bound texture.
    Volume,
    /// Unfilterable float 2D texture.
    Color2d,
    /// Depth attachment read with `textureLoad` as unfilterable float, which
    /// every backend including GL can translate.
    Depth2d,
    /// 1D RGBA lookup table.
    Lookup1d,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Uniforms,
    Texture { unit: u32, slot: TextureSlot },
    Image { slot: u32, format: wgpu::TextureFormat },
}

/// A `@group(0)` entry of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDecl {
    pub binding: u32,
    pub kind: BindingKind,
}

const fn uniforms() -> BindingDecl {
    BindingDecl {
        binding: 0,
        kind: BindingKind::Uniforms,
    }
}

const fn texture(binding: u32, unit: u32, slot: TextureSlot) -> BindingDecl {
    BindingDecl {
        binding,
        kind: BindingKind::Texture { unit, slot },
    }
}

const fn image(binding: u32, slot: u32, format: wgpu::TextureFormat) -> BindingDecl {
    BindingDecl {
        binding,
        kind: BindingKind::Image { slot, format },
    }
}

const CHAINED_RAYCAST: &[BindingDecl] = &[
    uniforms(),
    texture(1, VOLUME_UNIT, TextureSlot::Volume),
    texture(2, TRANSFER_FUNCTION_UNIT, TextureSlot::Lookup1d),
    texture(3, SNAPSHOT_COLOR_UNIT, TextureSlot::Color2d),
    texture(4, SNAPSHOT_DEPTH_UNIT, TextureSlot::Depth2d),
    image(5, COLOR_IMAGE_SLOT, wgpu::TextureFormat::Rgba8Unorm),
];

const ISOSURFACE: &[BindingDecl] = &[
    uniforms(),
    texture(1, VOLUME_UNIT, TextureSlot::Volume),
    image(5, COLOR_IMAGE_SLOT, wgpu::TextureFormat::Rgba8Unorm),
    image(6, NORMAL_IMAGE_SLOT, wgpu::TextureFormat::Rgba32Float),
    image(7, DEPTH_IMAGE_SLOT, wgpu::TextureFormat::R32Float),
];

const COMPOSITE: &[BindingDecl] = &[
    texture(1, SOURCE_UNIT, TextureSlot::Color2d),
    texture(2, SECONDARY_UNIT, TextureSlot::Color2d),
    texture(3, DEPTH_UNIT, TextureSlot::Color2d),
];

const COMPOSITE_AGGREGATE: &[BindingDecl] = &[
    uniforms(),
    texture(1, SOURCE_UNIT, TextureSlot::Color2d),
    texture(2, SECONDARY_UNIT, TextureSlot::Lookup1d),
];

/// The binding table of `program`.
#[must_use]
pub fn bindings(program: ProgramId) -> &'static [BindingDecl] {
    match program {
        ProgramId::RaycastIntegration | ProgramId::RaycastAggregate => CHAINED_RAYCAST,
        ProgramId::RaycastIsosurface => ISOSURFACE,
        ProgramId::Composite => COMPOSITE,
        ProgramId::CompositeAggregate => COMPOSITE_AGGREGATE,
    }
}

/// The texture unit holding the volume, for compute programs.
#[must_use]
pub fn volume_unit(program: ProgramId) -> Option<u32> {
    bindings(program).iter().find_map(|decl| match decl.kind {
        BindingKind::Texture {
            unit,
            slot: TextureSlot::Volume,
        } => Some(unit),
        _ => None,
    })
}

fn layout_entry(
    decl: &BindingDecl,
    volume: SampleKind,
    uniform_size: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    let unfilterable = wgpu::TextureSampleType::Float { filterable: false };
    let ty = match decl.kind {
        BindingKind::Uniforms => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(u64::from(uniform_size)),
        },
        BindingKind::Texture { slot, .. } => {
            let (sample_type, view_dimension) = match slot {
                TextureSlot::Volume => (
                    match volume {
                        SampleKind::Float => unfilterable,
                        SampleKind::Uint => wgpu::TextureSampleType::Uint,
                        SampleKind::Sint => wgpu::TextureSampleType::Sint,
                    },
                    wgpu::TextureViewDimension::D3,
                ),
                TextureSlot::Color2d => (unfilterable, wgpu::TextureViewDimension::D2),
                TextureSlot::Depth2d => (unfilterable, wgpu::TextureViewDimension::D2),
                TextureSlot::Lookup1d => (unfilterable, wgpu::TextureViewDimension::D1),
            };
            wgpu::BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled: false,
            }
        }
        BindingKind::Image { format, .. } => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
    };
    wgpu::BindGroupLayoutEntry {
        binding: decl.binding,
        visibility,
        ty,
        count: None,
    }
}

fn create_bind_group_layout(
    device: &wgpu::Device,
    program: ProgramId,
    volume: SampleKind,
    uniform_size: u32,
) -> wgpu::BindGroupLayout {
    let visibility = if program.is_compute() {
        wgpu::ShaderStages::COMPUTE
    } else {
        wgpu::ShaderStages::FRAGMENT
    };
    let entries: Vec<_> = bindings(program)
        .iter()
        .map(|decl| layout_entry(decl, volume, uniform_size, visibility))
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(program.source_name()),
        entries: &entries,
    })
}

/// One compute pipeline per volume sample kind.
pub(crate) struct ComputeVariant {
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) pipeline: wgpu::ComputePipeline,
}

enum Stage {
    Compute(HashMap<SampleKind, ComputeVariant>),
    Raster {
        module: wgpu::ShaderModule,
        bind_group_layout: wgpu::BindGroupLayout,
        pipeline_layout: wgpu::PipelineLayout,
        pipelines: RefCell<HashMap<(RasterState, u32), wgpu::RenderPipeline>>,
    },
}

/// A compiled program with its uniform storage.
pub struct WgpuProgram {
    id: ProgramId,
    uniforms: UniformBlock,
    buffer: Option<wgpu::Buffer>,
    stage: Stage,
}

impl WgpuProgram {
    /// Builds the modules and pipelines of `id`. Validation and internal
    /// errors raised while doing so, including shaders the platform
    /// translator rejects, are returned as compilation failures.
    pub(crate) fn compile(device: &wgpu::Device, id: ProgramId) -> RenderResult<Self> {
        let (result, error) = with_error_scopes(device, || Self::build(device, id));
        let program = result?;
        match error {
            Some(ScopedError::Validation(message) | ScopedError::Internal(message)) => Err(
                RenderError::ShaderCompilationFailed(format!("{}: {message}", id.source_name())),
            ),
            Some(error @ ScopedError::OutOfMemory(_)) => Err(error.into()),
            None => {
                log::debug!("compiled program {}", id.source_name());
                Ok(program)
            }
        }
    }

    fn build(device: &wgpu::Device, id: ProgramId) -> RenderResult<Self> {
        let layout = UniformLayout::for_program(id);
        let uniform_size = layout.size();
        let buffer = (!layout.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(id.source_name()),
                contents: &vec![0u8; uniform_size as usize],
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        });

        let stage = if id.is_compute() {
            let mut variants = HashMap::new();
            for kind in [SampleKind::Float, SampleKind::Uint, SampleKind::Sint] {
                let module = ShaderBuilder::for_program(id)
                    .with_volume_scalar(kind)
                    .build_module(device)?;
                let bind_group_layout = create_bind_group_layout(device, id, kind, uniform_size);
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(id.source_name()),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(id.source_name()),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some("main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                });
                variants.insert(
                    kind,
                    ComputeVariant {
                        bind_group_layout,
                        pipeline,
                    },
                );
            }
            Stage::Compute(variants)
        } else {
            let module = ShaderBuilder::for_program(id).build_module(device)?;
            let bind_group_layout =
                create_bind_group_layout(device, id, SampleKind::Float, uniform_size);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(id.source_name()),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            Stage::Raster {
                module,
                bind_group_layout,
                pipeline_layout,
                pipelines: RefCell::default(),
            }
        };

        let program = Self {
            id,
            uniforms: UniformBlock::new(layout),
            buffer,
            stage,
        };
        // Fragment stages are only translated for the platform when a
        // pipeline is built, so build the default one now.
        if !id.is_compute() {
            program.render_pipeline(device, RasterState::default(), 1)?;
        }
        Ok(program)
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    pub(crate) fn set_uniform(&mut self, name: &str, value: UniformValue) -> RenderResult<()> {
        self.uniforms.set(name, value)
    }

    pub(crate) fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// Copies the CPU uniform block into the GPU buffer.
    pub(crate) fn upload_uniforms(&self, queue: &wgpu::Queue) {
        if let Some(buffer) = &self.buffer {
            queue.write_buffer(buffer, 0, self.uniforms.bytes());
        }
    }

    pub(crate) fn compute_variant(&self, kind: SampleKind) -> Option<&ComputeVariant> {
        match &self.stage {
            Stage::Compute(variants) => variants.get(&kind),
            Stage::Raster { .. } => None,
        }
    }

    pub(crate) fn raster_bind_group_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        match &self.stage {
            Stage::Raster {
                bind_group_layout, ..
            } => Some(bind_group_layout),
            Stage::Compute(_) => None,
        }
    }

    /// The full-screen pipeline for `state` writing `draw_buffers` color
    /// attachments. Pipelines are created on first use and cached.
    pub(crate) fn render_pipeline(
        &self,
        device: &wgpu::Device,
        state: RasterState,
        draw_buffers: u32,
    ) -> RenderResult<wgpu::RenderPipeline> {
        let Stage::Raster {
            module,
            pipeline_layout,
            pipelines,
            ..
        } = &self.stage
        else {
            return Err(RenderError::PipelineCreationFailed(format!(
                "{} is a compute program",
                self.id.source_name()
            )));
        };
        if let Some(pipeline) = pipelines.borrow().get(&(state, draw_buffers)) {
            return Ok(pipeline.clone());
        }
        let pipeline = self.create_render_pipeline(device, module, pipeline_layout, state, draw_buffers)?;
        log::debug!(
            "created {} pipeline for {state:?} with {draw_buffers} draw buffers",
            self.id.source_name()
        );
        pipelines
            .borrow_mut()
            .insert((state, draw_buffers), pipeline.clone());
        Ok(pipeline)
    }

    fn create_render_pipeline(
        &self,
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        pipeline_layout: &wgpu::PipelineLayout,
        state: RasterState,
        draw_buffers: u32,
    ) -> RenderResult<wgpu::RenderPipeline> {
        let entry_point = match (self.id, draw_buffers) {
            (_, 1) => "fs_main",
            (ProgramId::Composite, 2) => "fs_main_dual",
            _ => {
                return Err(RenderError::PipelineCreationFailed(format!(
                    "{} cannot write {draw_buffers} draw buffers",
                    self.id.source_name()
                )))
            }
        };

        let blend = blend_state(&state);
        let targets: Vec<_> = [OUTPUT_COLOR_FORMAT, OUTPUT_NORMAL_FORMAT]
            .into_iter()
            .take(draw_buffers as usize)
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.id.source_name()),
            layout: Some(pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some(entry_point),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(depth_stencil_state(&state)),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        }))
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

/// Blend state of `state`, `None` when blending is off.
#[must_use]
pub fn blend_state(state: &RasterState) -> Option<wgpu::BlendState> {
    let func = state.blend_func;
    state.blend_enabled.then(|| wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(func.src_rgb),
            dst_factor: blend_factor(func.dst_rgb),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(func.src_alpha),
            dst_factor: blend_factor(func.dst_alpha),
            operation: wgpu::BlendOperation::Add,
        },
    })
}

/// Depth state of `state`. With the test off nothing is compared or written.
#[must_use]
pub fn depth_stencil_state(state: &RasterState) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: state.depth_test,
        depth_compare: if state.depth_test {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}
