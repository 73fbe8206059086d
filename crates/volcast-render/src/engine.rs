//! The wgpu implementation of [`GpuBackend`].

use std::collections::BTreeMap;

use glam::Vec4;

use volcast_core::{
    ChainTarget, GpuBackend, ProgramId, RasterState, Result, TargetKind, UniformValue,
    VolumeFormat,
};

use crate::error::{with_error_scopes, RenderError, RenderResult};
use crate::program::{bindings, volume_unit, BindingKind, TextureSlot, WgpuProgram};
use crate::textures::{
    self, decode_rgba, OutputTarget, WgpuSnapshot, WgpuTexture, DEPTH_FORMAT, OUTPUT_COLOR_FORMAT,
};

/// Textures bound where a program samples but the caller bound nothing.
struct Fallbacks {
    color: WgpuTexture,
    depth: WgpuTexture,
    lookup: WgpuTexture,
}

impl Fallbacks {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> RenderResult<Self> {
        let color = textures::create_attachment(device, "fallback color", OUTPUT_COLOR_FORMAT, 1, 1)?;
        let depth = textures::create_attachment(device, "fallback depth", DEPTH_FORMAT, 1, 1)?;
        textures::clear_attachments(
            device,
            queue,
            &[(color.view(), wgpu::Color::TRANSPARENT)],
            Some((depth.view(), 1.0)),
        );
        let lookup = textures::create_lookup(device, queue, &[[0, 0, 0, 0], [255, 255, 255, 255]])?;
        Ok(Self {
            color,
            depth,
            lookup,
        })
    }
}

fn clear_color(color: Vec4) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(color.x),
        g: f64::from(color.y),
        b: f64::from(color.z),
        a: f64::from(color.w),
    }
}

/// A headless wgpu device driven through immediate-mode commands.
///
/// Full-screen draws go to an owned [`OutputTarget`] that stands in for the
/// host framebuffer; size it with [`WgpuBackend::resize_output`].
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    output: Option<OutputTarget>,
    units: BTreeMap<u32, WgpuTexture>,
    images: BTreeMap<u32, WgpuTexture>,
    raster: RasterState,
    draw_buffers: u32,
    fallback: Fallbacks,
}

impl WgpuBackend {
    /// Creates a backend on the first adapter wgpu offers, without a surface.
    pub async fn new_headless() -> RenderResult<Self> {
        Self::new_headless_with(wgpu::Backends::all()).await
    }

    /// Like [`Self::new_headless`], restricted to `backends`.
    pub async fn new_headless_with(backends: wgpu::Backends) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;
        log::info!("using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("volcast device (headless)"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        Self::from_device(device, queue)
    }

    /// Wraps an existing device, e.g. one shared with a host renderer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> RenderResult<Self> {
        let (fallback, error) = with_error_scopes(&device, || Fallbacks::new(&device, &queue));
        let fallback = fallback?;
        if let Some(error) = error {
            return Err(error.into());
        }
        Ok(Self {
            device,
            queue,
            output: None,
            units: BTreeMap::new(),
            images: BTreeMap::new(),
            raster: RasterState::default(),
            draw_buffers: 1,
            fallback,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Resizes the output framebuffer, clearing it. Returns whether it was
    /// recreated.
    pub fn resize_output(&mut self, width: u32, height: u32) -> RenderResult<bool> {
        if self
            .output
            .as_ref()
            .is_some_and(|o| o.width() == width && o.height() == height)
        {
            return Ok(false);
        }
        self.output = Some(textures::create_output(
            &self.device,
            &self.queue,
            width,
            height,
        )?);
        log::debug!("output resized to {width}x{height}");
        Ok(true)
    }

    pub fn output(&self) -> Option<&OutputTarget> {
        self.output.as_ref()
    }

    /// Clears the output color and depth. The normal attachment is cleared
    /// to transparent.
    pub fn clear_output(&mut self, color: Vec4, depth: f32) -> RenderResult<()> {
        let output = self.output.as_ref().ok_or(RenderError::NoOutput)?;
        textures::clear_attachments(
            &self.device,
            &self.queue,
            &[
                (output.color.view(), clear_color(color)),
                (output.normal.view(), wgpu::Color::TRANSPARENT),
            ],
            Some((output.depth.view(), depth)),
        );
        Ok(())
    }

    pub fn clear_snapshot(&mut self, snapshot: &WgpuSnapshot, color: Vec4, depth: f32) {
        textures::clear_attachments(
            &self.device,
            &self.queue,
            &[(snapshot.color.view(), clear_color(color))],
            Some((snapshot.depth.view(), depth)),
        );
    }

    /// Clears whichever framebuffer a chained renderer was handed.
    pub fn clear_chain_target(
        &mut self,
        target: &ChainTarget<'_, Self>,
        color: Vec4,
        depth: f32,
    ) -> RenderResult<()> {
        match target {
            ChainTarget::Snapshot(snapshot) => {
                self.clear_snapshot(snapshot, color, depth);
                Ok(())
            }
            ChainTarget::HostOutput => self.clear_output(color, depth),
        }
    }

    /// Reads the output color attachment as tightly packed RGBA8.
    pub fn read_output(&self) -> RenderResult<Vec<u8>> {
        let output = self.output.as_ref().ok_or(RenderError::NoOutput)?;
        textures::read_texture(&self.device, &self.queue, &output.color)
    }

    /// Runs `work` inside device error scopes.
    fn scoped<T>(&self, work: impl FnOnce(&Self) -> RenderResult<T>) -> RenderResult<T> {
        let (result, error) = with_error_scopes(&self.device, || work(self));
        let value = result?;
        match error {
            Some(error) => Err(error.into()),
            None => Ok(value),
        }
    }

    fn texture_for(&self, unit: u32, slot: TextureSlot) -> RenderResult<&WgpuTexture> {
        if let Some(texture) = self.units.get(&unit) {
            return Ok(texture);
        }
        match slot {
            TextureSlot::Volume => Err(RenderError::MissingBinding(unit)),
            TextureSlot::Color2d => Ok(&self.fallback.color),
            TextureSlot::Depth2d => Ok(&self.fallback.depth),
            TextureSlot::Lookup1d => Ok(&self.fallback.lookup),
        }
    }

    fn create_bind_group(
        &self,
        program: &WgpuProgram,
        layout: &wgpu::BindGroupLayout,
    ) -> RenderResult<wgpu::BindGroup> {
        let mut entries = Vec::new();
        for decl in bindings(program.id()) {
            let resource = match decl.kind {
                BindingKind::Uniforms => program
                    .buffer()
                    .ok_or_else(|| {
                        RenderError::PipelineCreationFailed(format!(
                            "{} has no uniform buffer",
                            program.id().source_name()
                        ))
                    })?
                    .as_entire_binding(),
                BindingKind::Texture { unit, slot } => {
                    wgpu::BindingResource::TextureView(self.texture_for(unit, slot)?.view())
                }
                BindingKind::Image { slot, .. } => wgpu::BindingResource::TextureView(
                    self.images
                        .get(&slot)
                        .ok_or(RenderError::MissingImage(slot))?
                        .view(),
                ),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: decl.binding,
                resource,
            });
        }
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.id().source_name()),
            layout,
            entries: &entries,
        }))
    }

    fn run_dispatch(&self, program: &WgpuProgram, groups: [u32; 3]) -> RenderResult<()> {
        let id = program.id();
        let unit = volume_unit(id).ok_or_else(|| {
            RenderError::PipelineCreationFailed(format!("{} is not a compute program", id.source_name()))
        })?;
        let volume = self.units.get(&unit).ok_or(RenderError::MissingBinding(unit))?;
        let kind = volume
            .sample_kind()
            .ok_or_else(|| RenderError::TextureCreationFailed("bound volume is not 3D".into()))?;
        let variant = program.compute_variant(kind).ok_or_else(|| {
            RenderError::PipelineCreationFailed(format!("{} has no {kind:?} variant", id.source_name()))
        })?;

        let bind_group = self.create_bind_group(program, &variant.bind_group_layout)?;
        program.upload_uniforms(&self.queue);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("raycast encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(id.source_name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&variant.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let [x, y, z] = groups;
            pass.dispatch_workgroups(x, y, z);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn run_draw(&self, program: &WgpuProgram, vertex_count: u32) -> RenderResult<()> {
        let output = self.output.as_ref().ok_or(RenderError::NoOutput)?;
        let layout = program.raster_bind_group_layout().ok_or_else(|| {
            RenderError::PipelineCreationFailed(format!(
                "{} is not a raster program",
                program.id().source_name()
            ))
        })?;
        let pipeline = program.render_pipeline(&self.device, self.raster, self.draw_buffers)?;
        let bind_group = self.create_bind_group(program, layout)?;
        program.upload_uniforms(&self.queue);

        let color_attachments: Vec<_> = [&output.color, &output.normal]
            .into_iter()
            .take(self.draw_buffers as usize)
            .map(|target| {
                Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("composite encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(program.id().source_name()),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: output.depth.view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..vertex_count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    type Program = WgpuProgram;
    type Texture = WgpuTexture;
    type Snapshot = WgpuSnapshot;

    fn compile_program(&mut self, id: ProgramId) -> Result<WgpuProgram> {
        Ok(WgpuProgram::compile(&self.device, id)?)
    }

    fn create_volume_texture(
        &mut self,
        format: VolumeFormat,
        resolution: [u32; 3],
        data: &[u8],
    ) -> Result<WgpuTexture> {
        let texture = self.scoped(|b| {
            textures::create_volume(&b.device, &b.queue, format, resolution, data)
        })?;
        log::debug!("uploaded {format:?} volume {resolution:?}");
        Ok(texture)
    }

    fn create_target(&mut self, kind: TargetKind, width: u32, height: u32) -> Result<WgpuTexture> {
        Ok(self.scoped(|b| textures::create_target(&b.device, kind, width, height))?)
    }

    fn create_lookup_texture(&mut self, texels: &[[u8; 4]]) -> Result<WgpuTexture> {
        Ok(self.scoped(|b| textures::create_lookup(&b.device, &b.queue, texels))?)
    }

    fn create_snapshot(&mut self, width: u32, height: u32) -> Result<WgpuSnapshot> {
        Ok(self.scoped(|b| textures::create_snapshot(&b.device, &b.queue, width, height))?)
    }

    fn snapshot_color(&self, snapshot: &WgpuSnapshot) -> WgpuTexture {
        snapshot.color.clone()
    }

    fn snapshot_depth(&self, snapshot: &WgpuSnapshot) -> WgpuTexture {
        snapshot.depth.clone()
    }

    fn set_uniform(
        &mut self,
        program: &mut WgpuProgram,
        name: &str,
        value: UniformValue,
    ) -> Result<()> {
        Ok(program.set_uniform(name, value)?)
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<&WgpuTexture>) {
        match texture {
            Some(texture) => self.units.insert(unit, texture.clone()),
            None => self.units.remove(&unit),
        };
    }

    fn bind_image(&mut self, slot: u32, texture: Option<&WgpuTexture>) {
        match texture {
            Some(texture) => self.images.insert(slot, texture.clone()),
            None => self.images.remove(&slot),
        };
    }

    fn dispatch(&mut self, program: &WgpuProgram, groups: [u32; 3]) -> Result<()> {
        Ok(self.scoped(|b| b.run_dispatch(program, groups))?)
    }

    // Submissions on one queue execute in order and wgpu inserts the
    // storage-to-sampled transitions itself.
    fn memory_barrier(&mut self) {}

    fn read_rgba(&mut self, texture: &WgpuTexture) -> Result<Vec<f32>> {
        let bytes = textures::read_texture(&self.device, &self.queue, texture)?;
        Ok(decode_rgba(texture.format(), &bytes)?)
    }

    fn raster_state(&self) -> RasterState {
        self.raster
    }

    fn set_raster_state(&mut self, state: RasterState) {
        self.raster = state;
    }

    fn set_draw_buffers(&mut self, count: u32) {
        self.draw_buffers = count;
    }

    fn draw_fullscreen(&mut self, program: &WgpuProgram, vertex_count: u32) -> Result<()> {
        Ok(self.scoped(|b| b.run_draw(program, vertex_count))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScopedError;
    use volcast_core::{BlendFunc, RaycastError};

    fn backend() -> Option<WgpuBackend> {
        match pollster::block_on(WgpuBackend::new_headless()) {
            Ok(backend) => Some(backend),
            Err(e) => {
                eprintln!("skipping: {e}");
                None
            }
        }
    }

    #[test]
    fn test_clear_color_conversion() {
        let color = clear_color(Vec4::new(1.0, 0.5, 0.0, 0.25));
        assert_eq!((color.r, color.g, color.b, color.a), (1.0, 0.5, 0.0, 0.25));
    }

    #[test]
    fn test_all_programs_compile() {
        let Some(mut backend) = backend() else { return };
        for id in ProgramId::ALL {
            let program = backend.compile_program(id);
            assert!(program.is_ok(), "{id:?}: {:?}", program.err());
        }
    }

    #[test]
    fn test_programs_compile_on_gl() {
        let Ok(mut backend) = pollster::block_on(WgpuBackend::new_headless_with(wgpu::Backends::GL))
        else {
            eprintln!("skipping: no GL adapter");
            return;
        };
        for id in ProgramId::ALL {
            let program = backend.compile_program(id);
            assert!(program.is_ok(), "{id:?}: {:?}", program.err());
        }
    }

    #[test]
    fn test_device_errors_are_captured() {
        let Some(backend) = backend() else { return };
        let (_, error) = with_error_scopes(backend.device(), || {
            backend
                .device()
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("broken"),
                    source: wgpu::ShaderSource::Wgsl("fn main( {".into()),
                })
        });
        assert!(matches!(error, Some(ScopedError::Validation(_))), "{error:?}");

        let result = backend.scoped(|b| {
            let _ = b.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("broken"),
                source: wgpu::ShaderSource::Wgsl("fn main( {".into()),
            });
            Ok(())
        });
        assert!(matches!(result, Err(RenderError::Validation(_))));
    }

    #[test]
    fn test_unknown_uniform_is_missing_parameter() {
        let Some(mut backend) = backend() else { return };
        let mut program = backend.compile_program(ProgramId::Composite).unwrap();
        let result = backend.set_uniform(&mut program, "val_range", UniformValue::F32(0.0));
        assert!(matches!(result, Err(RaycastError::MissingShaderParameter(_))));
    }

    #[test]
    fn test_dispatch_without_volume_fails() {
        let Some(mut backend) = backend() else { return };
        let program = backend.compile_program(ProgramId::RaycastAggregate).unwrap();
        assert!(backend.dispatch(&program, [1, 1, 1]).is_err());
    }

    #[test]
    fn test_draw_requires_output() {
        let Some(mut backend) = backend() else { return };
        let program = backend.compile_program(ProgramId::Composite).unwrap();
        assert!(backend.draw_fullscreen(&program, 6).is_err());
    }

    #[test]
    fn test_lookup_round_trips_through_composite() {
        let Some(mut backend) = backend() else { return };
        backend.resize_output(4, 4).unwrap();
        backend.clear_output(Vec4::ZERO, 1.0).unwrap();

        let source = backend.create_target(TargetKind::Color, 4, 4).unwrap();
        // An aggregate target whose alpha is zero everywhere is discarded.
        let lut = backend.create_lookup_texture(&[[255, 0, 0, 255]; 2]).unwrap();
        let mut program = backend.compile_program(ProgramId::CompositeAggregate).unwrap();
        backend
            .set_uniform(&mut program, "val_range", UniformValue::Vec2(glam::Vec2::new(0.0, 1.0)))
            .unwrap();
        backend.bind_texture(0, Some(&source));
        backend.bind_texture(1, Some(&lut));
        backend.draw_fullscreen(&program, 6).unwrap();

        let pixels = backend.read_output().unwrap();
        assert!(pixels.chunks_exact(4).all(|p| p == [0, 0, 0, 0]));
    }

    #[test]
    fn test_composite_with_blend_state() {
        let Some(mut backend) = backend() else { return };
        backend.resize_output(2, 2).unwrap();
        backend.clear_output(Vec4::new(0.0, 0.0, 1.0, 1.0), 1.0).unwrap();
        let program = backend.compile_program(ProgramId::Composite).unwrap();
        backend.set_raster_state(RasterState {
            blend_enabled: true,
            blend_func: BlendFunc::ALPHA,
            depth_test: false,
        });
        // Unbound source falls back to a transparent texel, leaving the clear color.
        backend.draw_fullscreen(&program, 6).unwrap();
        let pixels = backend.read_output().unwrap();
        assert!(pixels.chunks_exact(4).all(|p| p == [0, 0, 255, 255]));
    }

    #[test]
    fn test_resize_output_only_when_changed() {
        let Some(mut backend) = backend() else { return };
        assert!(backend.resize_output(8, 8).unwrap());
        assert!(!backend.resize_output(8, 8).unwrap());
        assert!(backend.resize_output(8, 4).unwrap());
        assert_eq!(backend.output().unwrap().height(), 4);
    }
}
