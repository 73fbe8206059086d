//! Texture creation, clearing and synchronous readback.

use std::sync::Arc;

use volcast_core::{SampleKind, TargetKind, VolumeFormat};

use crate::error::{RenderError, RenderResult};

/// Format of the output color attachment.
pub const OUTPUT_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Format of the output's second attachment, written by isosurface compositing.
pub const OUTPUT_NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Format of every depth attachment.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Format of transfer function lookup tables.
pub const LOOKUP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug)]
struct TextureResource {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sample_kind: Option<SampleKind>,
}

/// A shared handle to a texture and its default view.
#[derive(Debug, Clone)]
pub struct WgpuTexture {
    inner: Arc<TextureResource>,
}

impl WgpuTexture {
    fn new(texture: wgpu::Texture, sample_kind: Option<SampleKind>) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            inner: Arc::new(TextureResource {
                texture,
                view,
                sample_kind,
            }),
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.inner.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.inner.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.inner.texture.format()
    }

    /// How shaders read this texture, for volume textures.
    pub fn sample_kind(&self) -> Option<SampleKind> {
        self.inner.sample_kind
    }

    pub fn size(&self) -> wgpu::Extent3d {
        self.inner.texture.size()
    }

    /// Whether both handles refer to the same texture.
    pub fn ptr_eq(&self, other: &WgpuTexture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Offscreen color + depth framebuffer the chained renderer draws into.
#[derive(Debug)]
pub struct WgpuSnapshot {
    pub(crate) color: WgpuTexture,
    pub(crate) depth: WgpuTexture,
}

impl WgpuSnapshot {
    pub fn color(&self) -> &WgpuTexture {
        &self.color
    }

    pub fn depth(&self) -> &WgpuTexture {
        &self.depth
    }
}

/// The framebuffer composited into: color, a second color attachment for
/// isosurface normals, and depth.
#[derive(Debug)]
pub struct OutputTarget {
    pub color: WgpuTexture,
    pub normal: WgpuTexture,
    pub depth: WgpuTexture,
}

impl OutputTarget {
    pub fn width(&self) -> u32 {
        self.color.size().width
    }

    pub fn height(&self) -> u32 {
        self.color.size().height
    }
}

/// Texture format of an uploaded volume. Integer volumes keep their raw
/// units.
#[must_use]
pub fn volume_format(format: VolumeFormat) -> wgpu::TextureFormat {
    match format {
        VolumeFormat::R32Float => wgpu::TextureFormat::R32Float,
        VolumeFormat::R8Uint => wgpu::TextureFormat::R8Uint,
        VolumeFormat::R16Uint => wgpu::TextureFormat::R16Uint,
        VolumeFormat::R16Sint => wgpu::TextureFormat::R16Sint,
    }
}

/// Texture format of a compute render target.
#[must_use]
pub fn target_format(kind: TargetKind) -> wgpu::TextureFormat {
    match kind {
        TargetKind::Color => wgpu::TextureFormat::Rgba8Unorm,
        TargetKind::Normal => wgpu::TextureFormat::Rgba32Float,
        TargetKind::Depth => wgpu::TextureFormat::R32Float,
    }
}

/// Bytes per texel of the formats that can be read back.
fn bytes_per_texel(format: wgpu::TextureFormat) -> Option<u32> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::R32Float => Some(4),
        wgpu::TextureFormat::Rgba32Float => Some(16),
        _ => None,
    }
}

/// Calculates bytes per row with proper alignment for wgpu buffer copies.
#[must_use]
pub fn aligned_bytes_per_row(width: u32, bytes_per_texel: u32) -> u32 {
    let unaligned = width * bytes_per_texel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

fn check_dimension(what: &str, size: u32, limit: u32) -> RenderResult<()> {
    if size == 0 || size > limit {
        return Err(RenderError::TextureCreationFailed(format!(
            "{what} dimension {size} outside 1..={limit}"
        )));
    }
    Ok(())
}

pub(crate) fn create_volume(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    format: VolumeFormat,
    resolution: [u32; 3],
    data: &[u8],
) -> RenderResult<WgpuTexture> {
    let limit = device.limits().max_texture_dimension_3d;
    for r in resolution {
        check_dimension("volume", r, limit)?;
    }
    let [width, height, depth] = resolution;
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: depth,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("volume"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D3,
        format: volume_format(format),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * format.bytes_per_voxel()),
            rows_per_image: Some(height),
        },
        size,
    );
    Ok(WgpuTexture::new(texture, Some(format.sample_kind())))
}

pub(crate) fn create_target(
    device: &wgpu::Device,
    kind: TargetKind,
    width: u32,
    height: u32,
) -> RenderResult<WgpuTexture> {
    let limit = device.limits().max_texture_dimension_2d;
    check_dimension("target", width, limit)?;
    check_dimension("target", height, limit)?;
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(match kind {
            TargetKind::Color => "raycast color",
            TargetKind::Normal => "raycast normal",
            TargetKind::Depth => "raycast depth",
        }),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: target_format(kind),
        usage: wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    Ok(WgpuTexture::new(texture, None))
}

pub(crate) fn create_lookup(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texels: &[[u8; 4]],
) -> RenderResult<WgpuTexture> {
    let width = u32::try_from(texels.len()).unwrap_or(u32::MAX);
    check_dimension("lookup table", width, device.limits().max_texture_dimension_1d)?;
    let size = wgpu::Extent3d {
        width,
        height: 1,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("transfer function"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D1,
        format: LOOKUP_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(1),
        },
        size,
    );
    Ok(WgpuTexture::new(texture, None))
}

/// Creates a render attachment that can also be sampled.
pub(crate) fn create_attachment(
    device: &wgpu::Device,
    label: &str,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> RenderResult<WgpuTexture> {
    let limit = device.limits().max_texture_dimension_2d;
    check_dimension(label, width, limit)?;
    check_dimension(label, height, limit)?;
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    Ok(WgpuTexture::new(texture, None))
}

pub(crate) fn create_snapshot(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
) -> RenderResult<WgpuSnapshot> {
    let snapshot = WgpuSnapshot {
        color: create_attachment(device, "chain snapshot color", OUTPUT_COLOR_FORMAT, width, height)?,
        depth: create_attachment(device, "chain snapshot depth", DEPTH_FORMAT, width, height)?,
    };
    clear_attachments(
        device,
        queue,
        &[(snapshot.color.view(), wgpu::Color::TRANSPARENT)],
        Some((snapshot.depth.view(), 1.0)),
    );
    Ok(snapshot)
}

pub(crate) fn create_output(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
) -> RenderResult<OutputTarget> {
    let output = OutputTarget {
        color: create_attachment(device, "output color", OUTPUT_COLOR_FORMAT, width, height)?,
        normal: create_attachment(device, "output normal", OUTPUT_NORMAL_FORMAT, width, height)?,
        depth: create_attachment(device, "output depth", DEPTH_FORMAT, width, height)?,
    };
    clear_attachments(
        device,
        queue,
        &[
            (output.color.view(), wgpu::Color::TRANSPARENT),
            (output.normal.view(), wgpu::Color::TRANSPARENT),
        ],
        Some((output.depth.view(), 1.0)),
    );
    Ok(output)
}

/// Clears color attachments and an optional depth attachment.
pub(crate) fn clear_attachments(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    colors: &[(&wgpu::TextureView, wgpu::Color)],
    depth: Option<(&wgpu::TextureView, f32)>,
) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("clear encoder"),
    });
    let color_attachments: Vec<_> = colors
        .iter()
        .map(|&(view, color)| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })
        })
        .collect();
    {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth.map(|(view, value)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(value),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            ..Default::default()
        });
    }
    queue.submit(std::iter::once(encoder.finish()));
}

/// Copies a 2D texture into a mapped buffer and returns its tightly packed
/// texels. Blocks until the GPU is done.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &WgpuTexture,
) -> RenderResult<Vec<u8>> {
    let format = texture.format();
    let texel_bytes = bytes_per_texel(format).ok_or(RenderError::UnreadableFormat(format))?;
    let wgpu::Extent3d { width, height, .. } = texture.size();
    let bytes_per_row = aligned_bytes_per_row(width, texel_bytes);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: u64::from(bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback copy encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: texture.texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::PollType::wait_indefinitely());
    rx.recv()
        .map_err(|_| RenderError::BufferMapFailed)?
        .map_err(|_| RenderError::BufferMapFailed)?;

    // Copy data, removing row padding
    let data = buffer_slice.get_mapped_range();
    let row_bytes = (width * texel_bytes) as usize;
    let mut result = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height {
        let start = (row * bytes_per_row) as usize;
        result.extend_from_slice(&data[start..start + row_bytes]);
    }
    drop(data);
    buffer.unmap();
    Ok(result)
}

/// Converts tightly packed texels of `format` into RGBA floats.
pub fn decode_rgba(format: wgpu::TextureFormat, bytes: &[u8]) -> RenderResult<Vec<f32>> {
    let read_f32 = |b: &[u8]| f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Ok(bytes.iter().map(|&b| f32::from(b) / 255.0).collect()),
        wgpu::TextureFormat::Rgba32Float => Ok(bytes.chunks_exact(4).map(read_f32).collect()),
        wgpu::TextureFormat::R32Float => Ok(bytes
            .chunks_exact(4)
            .flat_map(|b| [read_f32(b), 0.0, 0.0, 1.0])
            .collect()),
        other => Err(RenderError::UnreadableFormat(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(1, 4), 256);
        assert_eq!(aligned_bytes_per_row(64, 4), 256);
        assert_eq!(aligned_bytes_per_row(65, 4), 512);
        assert_eq!(aligned_bytes_per_row(17, 16), 512);
    }

    #[test]
    fn test_volume_formats_keep_raw_units() {
        assert_eq!(volume_format(VolumeFormat::R8Uint), wgpu::TextureFormat::R8Uint);
        assert_eq!(volume_format(VolumeFormat::R16Sint), wgpu::TextureFormat::R16Sint);
        assert_eq!(volume_format(VolumeFormat::R32Float), wgpu::TextureFormat::R32Float);
    }

    #[test]
    fn test_target_formats() {
        assert_eq!(target_format(TargetKind::Color), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(target_format(TargetKind::Normal), wgpu::TextureFormat::Rgba32Float);
        assert_eq!(target_format(TargetKind::Depth), wgpu::TextureFormat::R32Float);
        for kind in [TargetKind::Color, TargetKind::Normal, TargetKind::Depth] {
            assert!(bytes_per_texel(target_format(kind)).is_some());
        }
    }

    #[test]
    fn test_decode_rgba8() {
        let decoded = decode_rgba(wgpu::TextureFormat::Rgba8Unorm, &[0, 51, 204, 255]).unwrap();
        assert_eq!(decoded, vec![0.0, 0.2, 0.8, 1.0]);
    }

    #[test]
    fn test_decode_float_formats() {
        let bytes: Vec<u8> = [0.5f32, -1.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(
            decode_rgba(wgpu::TextureFormat::R32Float, &bytes).unwrap(),
            vec![0.5, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0]
        );
        assert_eq!(
            decode_rgba(wgpu::TextureFormat::Rgba32Float, &bytes).unwrap(),
            vec![0.5, -1.0]
        );
        assert!(matches!(
            decode_rgba(wgpu::TextureFormat::Depth32Float, &bytes),
            Err(RenderError::UnreadableFormat(_))
        ));
    }
}
