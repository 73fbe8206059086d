//! GPU-resident volume texture management.

use crate::backend::GpuBackend;
use crate::error::{RaycastError, Result};
use crate::geometry::VolumeGeometry;
use crate::metadata::{VolumeFormat, VolumeIdentity, VolumeMetadata};
use crate::range::ValueRange;
use crate::slot::ResourceSlot;
use crate::source::VolumeSource;

/// A volume snapshot that has been uploaded to the GPU.
#[derive(Debug)]
pub struct UploadedVolume<T> {
    pub texture: T,
    pub format: VolumeFormat,
    pub geometry: VolumeGeometry,
    /// Value range reported by the data set (before any user override).
    pub value_range: ValueRange,
}

/// Owns the volume texture and re-uploads it only when the data identity
/// changes.
pub struct VolumeResources<B: GpuBackend> {
    slot: ResourceSlot<VolumeIdentity, UploadedVolume<B::Texture>>,
    upload_count: u64,
}

impl<B: GpuBackend> Default for VolumeResources<B> {
    fn default() -> Self {
        Self {
            slot: ResourceSlot::new(),
            upload_count: 0,
        }
    }
}

impl<B: GpuBackend> VolumeResources<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The uploaded volume, if any.
    pub fn current(&self) -> Option<&UploadedVolume<B::Texture>> {
        self.slot.get()
    }

    /// Identity of the uploaded volume.
    pub fn identity(&self) -> Option<VolumeIdentity> {
        self.slot.key().copied()
    }

    /// Number of uploads performed so far.
    pub fn upload_count(&self) -> u64 {
        self.upload_count
    }

    /// Makes the GPU texture match frame `frame_id` of `source`.
    ///
    /// Returns `Ok(true)` when a new texture was uploaded and `Ok(false)` when
    /// the cached one is still current, in which case no backend call is made.
    pub fn ensure_current(
        &mut self,
        backend: &mut B,
        source: &mut dyn VolumeSource,
        frame_id: u32,
        max_attempts: u32,
    ) -> Result<bool> {
        let (identity, metadata) = sync_frame(source, frame_id, max_attempts)?;
        if self.slot.is_current(&identity) {
            return Ok(false);
        }

        let format = metadata.validate()?;
        let data = source.data();
        metadata.check_data_len(data.len())?;

        let geometry = metadata.geometry();
        let value_range = metadata.value_range();
        self.slot.ensure_with(identity, |_| {
            let texture = backend.create_volume_texture(format, metadata.resolution, data)?;
            Ok::<_, RaycastError>(UploadedVolume {
                texture,
                format,
                geometry,
                value_range,
            })
        })?;
        self.upload_count += 1;

        log::debug!(
            "uploaded volume frame {} (hash {:#x}): {:?} {:?}",
            identity.frame_id,
            identity.data_hash,
            metadata.resolution,
            format
        );
        Ok(true)
    }

    /// Releases the volume texture.
    pub fn release(&mut self) {
        self.slot.clear();
    }
}

/// Polls `source` until it reports `frame_id`, at most `max_attempts` times.
fn sync_frame(
    source: &mut dyn VolumeSource,
    frame_id: u32,
    max_attempts: u32,
) -> Result<(VolumeIdentity, VolumeMetadata)> {
    for attempt in 1..=max_attempts {
        source.get_extents(frame_id)?;
        let metadata = source.get_metadata(frame_id)?;
        let identity = source.get_data(frame_id)?;
        if identity.frame_id == frame_id {
            return Ok((identity, metadata));
        }
        log::trace!(
            "volume source holds frame {} while {frame_id} was requested (attempt {attempt})",
            identity.frame_id
        );
    }
    Err(RaycastError::FrameSyncTimeout {
        requested: frame_id,
        attempts: max_attempts,
    })
}
