//! Per-frame orchestration of the raycasting pipeline.

use glam::{Vec3, Vec4};

use crate::backend::GpuBackend;
use crate::camera::CameraMatrices;
use crate::chain::{ChainTarget, ChainedRenderer};
use crate::composite::{CompositeInputs, Compositor};
use crate::error::{RaycastError, Result};
use crate::geometry::BoundingBox;
use crate::options::RaycastOptions;
use crate::raycast::{ChainSnapshot, RaycastEngine, RaycastInputs, RaycastOutcome, RaycastPrograms};
use crate::source::VolumeSource;
use crate::targets::RenderTargets;
use crate::transfer_function::{TransferFunctionBinding, TransferFunctionProvider};
use crate::volume::VolumeResources;

/// One frame to render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRequest {
    pub width: u32,
    pub height: u32,
    pub camera: CameraMatrices,
    /// Animation time; its integer part selects the volume frame.
    pub time: f32,
    /// World-space position of the light.
    pub light_position: Vec3,
    /// Background color of the host view, if it has one.
    pub background: Option<Vec4>,
}

impl FrameRequest {
    #[must_use]
    pub fn new(width: u32, height: u32, camera: CameraMatrices) -> Self {
        Self {
            width,
            height,
            camera,
            time: 0.0,
            light_position: Vec3::new(0.0, 0.0, 1.0),
            background: None,
        }
    }

    #[must_use]
    pub fn with_time(mut self, time: f32) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_light_position(mut self, position: Vec3) -> Self {
        self.light_position = position;
        self
    }

    #[must_use]
    pub fn with_background(mut self, color: Vec4) -> Self {
        self.background = Some(color);
        self
    }

    /// Volume frame selected by `time`.
    #[must_use]
    pub fn frame_id(&self) -> u32 {
        frame_id_at(self.time)
    }

    /// Opaque background color, white when the host view has none.
    #[must_use]
    pub fn background_color(&self) -> Vec4 {
        self.background
            .map_or(Vec4::ONE, |c| c.truncate().extend(1.0))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn frame_id_at(time: f32) -> u32 {
    if time.is_finite() && time > 0.0 {
        time.floor() as u32
    } else {
        0
    }
}

/// Bounds of everything rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneExtents {
    pub bounding_box: BoundingBox,
    pub clip_box: BoundingBox,
    /// Number of time steps of the volume.
    pub frame_count: u32,
}

/// Raycasts a volume over the output of an optional chained renderer.
pub struct RaycastVolumeRenderer<B: GpuBackend> {
    options: RaycastOptions,
    programs: RaycastPrograms<B::Program>,
    volume: VolumeResources<B>,
    targets: RenderTargets<B>,
    transfer_function: TransferFunctionBinding<B>,
    source: Option<Box<dyn VolumeSource>>,
    chained: Option<Box<dyn ChainedRenderer<B>>>,
    provider: Option<Box<dyn TransferFunctionProvider<B>>>,
    last_outcome: Option<RaycastOutcome>,
}

impl<B: GpuBackend> RaycastVolumeRenderer<B> {
    /// Builds all programs.
    ///
    /// # Errors
    /// Invalid options, or any program failing to build, in which case no
    /// renderer exists.
    pub fn create(backend: &mut B, options: RaycastOptions) -> Result<Self> {
        options.validate()?;
        let programs = RaycastPrograms::compile(backend)?;
        log::debug!("raycast volume renderer created ({} mode)", options.mode.name());
        Ok(Self {
            options,
            programs,
            volume: VolumeResources::new(),
            targets: RenderTargets::new(),
            transfer_function: TransferFunctionBinding::new(),
            source: None,
            chained: None,
            provider: None,
            last_outcome: None,
        })
    }

    pub fn options(&self) -> &RaycastOptions {
        &self.options
    }

    /// Replaces the options, keeping the current ones when `options` is
    /// invalid.
    pub fn set_options(&mut self, options: RaycastOptions) -> Result<()> {
        options.validate()?;
        self.options = options;
        Ok(())
    }

    pub fn set_volume_source(&mut self, source: impl VolumeSource + 'static) {
        self.source = Some(Box::new(source));
    }

    pub fn set_chained_renderer(&mut self, renderer: impl ChainedRenderer<B> + 'static) {
        self.chained = Some(Box::new(renderer));
    }

    pub fn clear_chained_renderer(&mut self) {
        self.chained = None;
    }

    pub fn set_transfer_function_provider(
        &mut self,
        provider: impl TransferFunctionProvider<B> + 'static,
    ) {
        self.provider = Some(Box::new(provider));
    }

    pub fn clear_transfer_function_provider(&mut self) {
        self.provider = None;
    }

    /// Outcome of the last successful frame.
    pub fn last_outcome(&self) -> Option<RaycastOutcome> {
        self.last_outcome
    }

    pub fn volume(&self) -> &VolumeResources<B> {
        &self.volume
    }

    pub fn targets(&self) -> &RenderTargets<B> {
        &self.targets
    }

    /// Scene bounds at `time`: the volume box united with the chained
    /// renderer's bounds.
    pub fn extents(&mut self, time: f32) -> Result<SceneExtents> {
        let source = self.source.as_deref_mut().ok_or(RaycastError::NoDataSource)?;
        let frame_id = frame_id_at(time);
        let mut bounding_box = source.get_extents(frame_id)?;
        source.get_metadata(frame_id)?;
        let mut clip_box = bounding_box;
        let frame_count = source.frame_count();

        if let Some(chained) = self.chained.as_mut() {
            let chained = chained.extents(time)?;
            bounding_box = bounding_box.union(&chained.bounding_box);
            clip_box = clip_box.union(&chained.clip_box);
        }
        Ok(SceneExtents {
            bounding_box,
            clip_box,
            frame_count,
        })
    }

    /// Renders one frame into the host output.
    ///
    /// A failing frame is skipped: nothing is composited and the error is
    /// returned. Host raster state and bindings are left as they were.
    pub fn render(&mut self, backend: &mut B, frame: &FrameRequest) -> Result<RaycastOutcome> {
        match self.render_frame(backend, frame) {
            Ok(outcome) => {
                self.last_outcome = Some(outcome);
                Ok(outcome)
            }
            Err(e) => {
                log::error!("skipping volume frame at t={}: {e}", frame.time);
                Err(e)
            }
        }
    }

    fn render_frame(&mut self, backend: &mut B, frame: &FrameRequest) -> Result<RaycastOutcome> {
        if self.source.is_none() {
            return Err(RaycastError::NoDataSource);
        }
        let mode = self.options.render_mode();
        let (width, height) = (frame.width, frame.height);

        let mut snapshot = None;
        if let Some(chained) = self.chained.as_mut() {
            if mode.snapshots_chained_output() {
                let fbo = self.targets.create_snapshot(backend, width, height)?;
                chained.render(backend, ChainTarget::Snapshot(&fbo), frame)?;
                snapshot = Some(fbo);
            } else {
                chained.render(backend, ChainTarget::HostOutput, frame)?;
            }
        }

        self.targets.ensure(backend, width, height)?;

        let source = self.source.as_deref_mut().ok_or(RaycastError::NoDataSource)?;
        self.volume.ensure_current(
            backend,
            source,
            frame.frame_id(),
            self.options.frame_sync_max_attempts,
        )?;

        if mode.uses_transfer_function() {
            let provider: Option<&mut dyn TransferFunctionProvider<B>> = match self.provider.as_mut() {
                Some(p) => Some(p.as_mut()),
                None => None,
            };
            self.transfer_function.refresh(backend, provider)?;
        }

        let volume = self.volume.current().ok_or(RaycastError::NoDataSource)?;
        let targets = self
            .targets
            .current()
            .ok_or(RaycastError::InvalidViewport { width, height })?;
        let snapshot_textures = snapshot
            .as_ref()
            .map(|fbo| (backend.snapshot_color(fbo), backend.snapshot_depth(fbo)));

        let inputs = RaycastInputs {
            mode,
            camera: frame.camera,
            volume,
            targets,
            transfer_function: self.transfer_function.handle(),
            snapshot: snapshot_textures
                .as_ref()
                .map(|(color, depth)| ChainSnapshot { color, depth }),
            options: &self.options,
            light_position: frame.light_position,
            background: frame.background_color(),
        };
        let outcome = RaycastEngine::raycast(backend, &mut self.programs, &inputs)?;

        let composite = CompositeInputs {
            mode,
            targets,
            transfer_function: self.transfer_function.handle(),
            readback_range: outcome.readback_range,
        };
        Compositor::composite(backend, &mut self.programs, &composite)?;
        Ok(outcome)
    }
}
