//! Headless rendering without a window.
//!
//! A [`HeadlessRenderer`] owns a wgpu device and a raycast renderer and
//! renders frames into its own output framebuffer. Useful for integration
//! tests, batch processing, and automated screenshot generation.

use glam::Vec4;
use pollster::FutureExt;

use volcast_core::{
    CameraMatrices, ChainedRenderer, FrameRequest, RaycastOptions, RaycastOutcome,
    RaycastVolumeRenderer, TransferFunctionProvider, VolumeSource,
};
use volcast_render::WgpuBackend;

use crate::error::Result;
use crate::screenshot::save_image;

/// Background used when a frame does not set one.
pub const DEFAULT_BACKGROUND: Vec4 = Vec4::ONE;

/// A wgpu device paired with a raycast renderer.
pub struct HeadlessRenderer {
    backend: WgpuBackend,
    renderer: RaycastVolumeRenderer<WgpuBackend>,
}

impl HeadlessRenderer {
    /// Creates a headless device and compiles the raycast programs.
    pub fn new(options: RaycastOptions) -> Result<Self> {
        let mut backend = WgpuBackend::new_headless().block_on()?;
        let renderer = RaycastVolumeRenderer::create(&mut backend, options)?;
        Ok(Self { backend, renderer })
    }

    pub fn backend(&self) -> &WgpuBackend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut WgpuBackend {
        &mut self.backend
    }

    pub fn renderer(&self) -> &RaycastVolumeRenderer<WgpuBackend> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut RaycastVolumeRenderer<WgpuBackend> {
        &mut self.renderer
    }

    pub fn set_volume_source(&mut self, source: impl VolumeSource + 'static) {
        self.renderer.set_volume_source(source);
    }

    pub fn set_chained_renderer(&mut self, chained: impl ChainedRenderer<WgpuBackend> + 'static) {
        self.renderer.set_chained_renderer(chained);
    }

    pub fn set_transfer_function_provider(
        &mut self,
        provider: impl TransferFunctionProvider<WgpuBackend> + 'static,
    ) {
        self.renderer.set_transfer_function_provider(provider);
    }

    /// A frame whose camera frames the whole scene at `time`.
    pub fn framed_request(&mut self, width: u32, height: u32, time: f32) -> Result<FrameRequest> {
        let extents = self.renderer.extents(time)?;
        let aspect = width as f32 / height.max(1) as f32;
        let camera = CameraMatrices::framing(&extents.bounding_box, aspect);
        Ok(FrameRequest::new(width, height, camera).with_time(time))
    }

    /// Renders `frame` and returns the output as tightly packed RGBA8 pixels.
    ///
    /// The output is cleared to the frame's background (or
    /// [`DEFAULT_BACKGROUND`]) and far depth first.
    pub fn render(&mut self, frame: &FrameRequest) -> Result<Vec<u8>> {
        self.render_with_outcome(frame).map(|(pixels, _)| pixels)
    }

    /// Like [`Self::render`], also returning what the raycast observed.
    pub fn render_with_outcome(&mut self, frame: &FrameRequest) -> Result<(Vec<u8>, RaycastOutcome)> {
        self.backend.resize_output(frame.width, frame.height)?;
        self.backend
            .clear_output(frame.background.unwrap_or(DEFAULT_BACKGROUND), 1.0)?;
        let outcome = self.renderer.render(&mut self.backend, frame)?;
        let pixels = self.backend.read_output()?;
        Ok((pixels, outcome))
    }
}

/// Renders `source` once with a camera framing its bounds.
///
/// Returns `width * height * 4` bytes of RGBA8, rows top to bottom.
pub fn render_to_image(
    source: impl VolumeSource + 'static,
    options: RaycastOptions,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let mut headless = HeadlessRenderer::new(options)?;
    headless.set_volume_source(source);
    let frame = headless.framed_request(width, height, 0.0)?;
    headless.render(&frame)
}

/// Renders `source` once and saves the frame as PNG or JPEG.
pub fn render_to_file(
    path: impl AsRef<std::path::Path>,
    source: impl VolumeSource + 'static,
    options: RaycastOptions,
    width: u32,
    height: u32,
) -> Result<()> {
    let pixels = render_to_image(source, options, width, height)?;
    save_image(path, &pixels, width, height)
}
