//! Transfer function binding and a built-in lookup-table provider.

use glam::Vec4;

use crate::backend::GpuBackend;
use crate::error::{RaycastError, Result};

/// Default number of texels of a [`LookupTableTransferFunction`].
pub const DEFAULT_TABLE_SIZE: usize = 256;

/// Supplies the 1D lookup texture mapping normalized scalars to RGBA.
///
/// The provider owns its texture; the returned handle is a shared reference
/// to it.
pub trait TransferFunctionProvider<B: GpuBackend> {
    fn fetch(&mut self, backend: &mut B) -> Result<B::Texture>;
}

/// The transfer-function handle currently used by the raycaster.
///
/// A failed or impossible fetch keeps the last known good handle, so
/// rendering continues with stale data.
pub struct TransferFunctionBinding<B: GpuBackend> {
    handle: Option<B::Texture>,
}

impl<B: GpuBackend> Default for TransferFunctionBinding<B> {
    fn default() -> Self {
        Self { handle: None }
    }
}

impl<B: GpuBackend> TransferFunctionBinding<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current handle, if one was ever fetched.
    pub fn handle(&self) -> Option<&B::Texture> {
        self.handle.as_ref()
    }

    /// Re-fetches the handle from `provider`.
    ///
    /// Always succeeds: a missing provider or a failed fetch is logged and
    /// the previous handle stays bound.
    pub fn refresh(
        &mut self,
        backend: &mut B,
        provider: Option<&mut (dyn TransferFunctionProvider<B> + '_)>,
    ) -> Result<()> {
        let Some(provider) = provider else {
            log::warn!("no transfer function provider connected, keeping previous transfer function");
            return Ok(());
        };
        match provider.fetch(backend) {
            Ok(texture) => self.handle = Some(texture),
            Err(e) => {
                let stale = RaycastError::StaleTransferFunction(e.to_string());
                log::warn!("{stale}, keeping previous transfer function");
            }
        }
        Ok(())
    }
}

/// A color stop of a transfer function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPoint {
    /// Normalized scalar position in `[0, 1]`.
    pub position: f32,
    pub color: Vec4,
}

impl ControlPoint {
    #[must_use]
    pub fn new(position: f32, color: Vec4) -> Self {
        Self { position, color }
    }
}

/// Piecewise-linear transfer function baked into an RGBA8 lookup texture.
///
/// The texture is uploaded on the first fetch and again after each edit.
#[derive(Debug, Clone)]
pub struct LookupTableTransferFunction<T> {
    points: Vec<ControlPoint>,
    size: usize,
    texture: Option<T>,
    dirty: bool,
}

impl<T> LookupTableTransferFunction<T> {
    /// Names accepted by [`Self::preset`].
    pub const PRESETS: [&'static str; 3] = ["grayscale", "viridis", "coolwarm"];

    /// Creates a transfer function from control points.
    ///
    /// Points are sorted by position.
    pub fn from_control_points(points: Vec<ControlPoint>) -> Result<Self> {
        let mut table = Self {
            points: Vec::new(),
            size: DEFAULT_TABLE_SIZE,
            texture: None,
            dirty: true,
        };
        table.set_control_points(points)?;
        Ok(table)
    }

    /// Linear ramp from transparent black to opaque white.
    pub fn grayscale() -> Self {
        Self {
            points: vec![
                ControlPoint::new(0.0, Vec4::ZERO),
                ControlPoint::new(1.0, Vec4::ONE),
            ],
            size: DEFAULT_TABLE_SIZE,
            texture: None,
            dirty: true,
        }
    }

    /// A named color map with opacity rising linearly from 0 to 1.
    pub fn preset(name: &str) -> Result<Self> {
        let colors: &[[f32; 3]] = match name {
            "grayscale" => return Ok(Self::grayscale()),
            "viridis" => &[
                [0.267, 0.004, 0.329],
                [0.282, 0.140, 0.457],
                [0.253, 0.265, 0.529],
                [0.206, 0.371, 0.553],
                [0.163, 0.471, 0.558],
                [0.127, 0.566, 0.550],
                [0.134, 0.658, 0.517],
                [0.266, 0.749, 0.440],
                [0.477, 0.821, 0.318],
                [0.741, 0.873, 0.150],
                [0.993, 0.906, 0.144],
            ],
            "coolwarm" => &[
                [0.230, 0.299, 0.754],
                [0.552, 0.690, 0.996],
                [0.866, 0.866, 0.866],
                [0.956, 0.604, 0.486],
                [0.706, 0.016, 0.150],
            ],
            other => {
                return Err(RaycastError::InvalidOption {
                    name: "transfer_function",
                    reason: format!("unknown preset '{other}'"),
                })
            }
        };
        #[allow(clippy::cast_precision_loss)]
        let last = (colors.len() - 1) as f32;
        let points = colors
            .iter()
            .enumerate()
            .map(|(i, c)| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32 / last;
                ControlPoint::new(t, Vec4::new(c[0], c[1], c[2], t))
            })
            .collect();
        Self::from_control_points(points)
    }

    /// Sets the number of texels of the lookup table (at least 2).
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size.max(2);
        self.dirty = true;
        self
    }

    pub fn control_points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Replaces the control points. The table is re-uploaded on next fetch.
    pub fn set_control_points(&mut self, mut points: Vec<ControlPoint>) -> Result<()> {
        if points.is_empty() {
            return Err(RaycastError::InvalidOption {
                name: "transfer_function",
                reason: "at least one control point is required".into(),
            });
        }
        if let Some(p) = points
            .iter()
            .find(|p| !(0.0..=1.0).contains(&p.position))
        {
            return Err(RaycastError::InvalidOption {
                name: "transfer_function",
                reason: format!("control point position {} outside [0, 1]", p.position),
            });
        }
        points.sort_by(|a, b| a.position.total_cmp(&b.position));
        self.points = points;
        self.dirty = true;
        Ok(())
    }

    /// Evaluates the transfer function at `t` (clamped to `[0, 1]`).
    pub fn sample(&self, t: f32) -> Vec4 {
        let t = t.clamp(0.0, 1.0);
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return Vec4::ZERO;
        };
        if t <= first.position {
            return first.color;
        }
        if t >= last.position {
            return last.color;
        }
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.position {
                let span = b.position - a.position;
                if span <= f32::EPSILON {
                    return b.color;
                }
                return a.color.lerp(b.color, (t - a.position) / span);
            }
        }
        last.color
    }

    /// The lookup table as RGBA8 texels.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn texels(&self) -> Vec<[u8; 4]> {
        let last = (self.size - 1) as f32;
        (0..self.size)
            .map(|i| {
                let c = self.sample(i as f32 / last).clamp(Vec4::ZERO, Vec4::ONE) * 255.0;
                [
                    c.x.round() as u8,
                    c.y.round() as u8,
                    c.z.round() as u8,
                    c.w.round() as u8,
                ]
            })
            .collect()
    }
}

impl<B: GpuBackend> TransferFunctionProvider<B> for LookupTableTransferFunction<B::Texture> {
    fn fetch(&mut self, backend: &mut B) -> Result<B::Texture> {
        if self.dirty || self.texture.is_none() {
            self.texture = None;
            let texture = backend.create_lookup_texture(&self.texels())?;
            log::debug!("uploaded {}-texel transfer function", self.size);
            self.texture = Some(texture);
            self.dirty = false;
        }
        self.texture
            .clone()
            .ok_or_else(|| RaycastError::StaleTransferFunction("lookup table missing".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Command, RecordingBackend, TextureHandle};

    struct FailingProvider;

    impl TransferFunctionProvider<RecordingBackend> for FailingProvider {
        fn fetch(&mut self, _backend: &mut RecordingBackend) -> Result<TextureHandle> {
            Err(RaycastError::DataSource("provider offline".into()))
        }
    }

    fn lookup_uploads(backend: &RecordingBackend) -> usize {
        backend
            .commands
            .iter()
            .filter(|c| matches!(c, Command::CreateLookup { .. }))
            .count()
    }

    #[test]
    fn test_refresh_updates_handle() {
        let mut backend = RecordingBackend::new();
        let mut binding = TransferFunctionBinding::new();
        let mut lut = LookupTableTransferFunction::<TextureHandle>::grayscale();
        assert!(binding.handle().is_none());

        binding.refresh(&mut backend, Some(&mut lut)).unwrap();
        assert!(binding.handle().is_some());
    }

    #[test]
    fn test_stale_handle_kept() {
        let mut backend = RecordingBackend::new();
        let mut binding = TransferFunctionBinding::new();
        let mut lut = LookupTableTransferFunction::<TextureHandle>::grayscale();
        binding.refresh(&mut backend, Some(&mut lut)).unwrap();
        let good = *binding.handle().unwrap();

        binding.refresh(&mut backend, Some(&mut FailingProvider)).unwrap();
        assert_eq!(binding.handle(), Some(&good));

        binding.refresh(&mut backend, None).unwrap();
        assert_eq!(binding.handle(), Some(&good));
    }

    #[test]
    fn test_no_provider_ever() {
        let mut backend = RecordingBackend::new();
        let mut binding = TransferFunctionBinding::<RecordingBackend>::new();
        binding.refresh(&mut backend, None).unwrap();
        assert!(binding.handle().is_none());
    }

    #[test]
    fn test_lookup_uploaded_once_until_edited() {
        let mut backend = RecordingBackend::new();
        let mut lut = LookupTableTransferFunction::<TextureHandle>::preset("viridis").unwrap();
        let first = TransferFunctionProvider::fetch(&mut lut, &mut backend).unwrap();
        let second = TransferFunctionProvider::fetch(&mut lut, &mut backend).unwrap();
        assert_eq!(first, second);
        assert_eq!(lookup_uploads(&backend), 1);

        lut.set_control_points(vec![ControlPoint::new(0.5, Vec4::ONE)])
            .unwrap();
        let third = TransferFunctionProvider::fetch(&mut lut, &mut backend).unwrap();
        assert_ne!(first, third);
        assert_eq!(lookup_uploads(&backend), 2);
    }

    #[test]
    fn test_sample_interpolates() {
        let lut = LookupTableTransferFunction::<()>::from_control_points(vec![
            ControlPoint::new(1.0, Vec4::new(1.0, 0.0, 0.0, 1.0)),
            ControlPoint::new(0.0, Vec4::new(0.0, 0.0, 1.0, 0.0)),
        ])
        .unwrap();
        assert_eq!(lut.control_points()[0].position, 0.0);
        let mid = lut.sample(0.5);
        assert!((mid - Vec4::new(0.5, 0.0, 0.5, 0.5)).length() < 1e-6);
        assert_eq!(lut.sample(-1.0), Vec4::new(0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn test_texels_span_ramp() {
        let lut = LookupTableTransferFunction::<()>::grayscale().with_size(4);
        let texels = lut.texels();
        assert_eq!(texels.len(), 4);
        assert_eq!(texels[0], [0, 0, 0, 0]);
        assert_eq!(texels[3], [255, 255, 255, 255]);
        assert_eq!(texels[1], [85, 85, 85, 85]);
    }

    #[test]
    fn test_presets() {
        for name in LookupTableTransferFunction::<()>::PRESETS {
            let lut = LookupTableTransferFunction::<()>::preset(name).unwrap();
            assert_eq!(lut.sample(0.0).w, 0.0);
            assert_eq!(lut.sample(1.0).w, 1.0);
        }
        assert!(LookupTableTransferFunction::<()>::preset("jet").is_err());
    }

    #[test]
    fn test_rejects_bad_control_points() {
        assert!(LookupTableTransferFunction::<()>::from_control_points(vec![]).is_err());
        assert!(LookupTableTransferFunction::<()>::from_control_points(vec![ControlPoint::new(
            1.5,
            Vec4::ONE
        )])
        .is_err());
    }
}
