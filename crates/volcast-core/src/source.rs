//! Volume data sources.

use crate::error::{RaycastError, Result};
use crate::geometry::BoundingBox;
use crate::metadata::{VolumeIdentity, VolumeMetadata};

/// A pull-based provider of volume frames.
///
/// Each call names the frame it wants. A source may need several rounds of
/// calls before it settles on that frame; the identity returned by
/// [`VolumeSource::get_data`] tells which frame is actually loaded.
pub trait VolumeSource {
    /// Number of frames in the time series.
    fn frame_count(&self) -> u32 {
        1
    }

    /// Object-space bounding box of `frame_id`.
    fn get_extents(&mut self, frame_id: u32) -> Result<BoundingBox>;

    fn get_metadata(&mut self, frame_id: u32) -> Result<VolumeMetadata>;

    /// Loads voxel data for `frame_id` and returns the identity of what is
    /// now held, which may be a different frame while the source settles.
    fn get_data(&mut self, frame_id: u32) -> Result<VolumeIdentity>;

    /// Raw voxels of the loaded frame, x fastest, then y, then z.
    fn data(&self) -> &[u8];
}

struct Frame {
    metadata: VolumeMetadata,
    data: Vec<u8>,
    hash: u64,
}

/// A volume time series held in memory.
///
/// The data hash of a frame changes whenever the frame is replaced.
pub struct InMemoryVolume {
    frames: Vec<Frame>,
    loaded: usize,
    next_hash: u64,
}

impl InMemoryVolume {
    /// Creates a single-frame volume.
    pub fn new(metadata: VolumeMetadata, data: Vec<u8>) -> Result<Self> {
        let mut volume = Self {
            frames: Vec::new(),
            loaded: 0,
            next_hash: 1,
        };
        volume.push_frame(metadata, data)?;
        Ok(volume)
    }

    /// Creates a single-frame `f32` volume.
    pub fn from_f32(metadata: VolumeMetadata, values: &[f32]) -> Result<Self> {
        Self::new(metadata, bytemuck::cast_slice(values).to_vec())
    }

    /// Appends a frame to the time series.
    pub fn push_frame(&mut self, metadata: VolumeMetadata, data: Vec<u8>) -> Result<()> {
        metadata.check_data_len(data.len())?;
        let hash = self.bump_hash();
        self.frames.push(Frame {
            metadata,
            data,
            hash,
        });
        Ok(())
    }

    /// Replaces the contents of an existing frame.
    pub fn replace_frame(
        &mut self,
        frame_id: u32,
        metadata: VolumeMetadata,
        data: Vec<u8>,
    ) -> Result<()> {
        metadata.check_data_len(data.len())?;
        let hash = self.bump_hash();
        let frame = self.frame_mut(frame_id)?;
        *frame = Frame {
            metadata,
            data,
            hash,
        };
        Ok(())
    }

    fn bump_hash(&mut self) -> u64 {
        let hash = self.next_hash;
        self.next_hash += 1;
        hash
    }

    fn index(&self, frame_id: u32) -> Result<usize> {
        let index = frame_id as usize;
        if index < self.frames.len() {
            Ok(index)
        } else {
            Err(RaycastError::DataSource(format!(
                "frame {frame_id} out of range ({} frames)",
                self.frames.len()
            )))
        }
    }

    fn frame_mut(&mut self, frame_id: u32) -> Result<&mut Frame> {
        let index = self.index(frame_id)?;
        Ok(&mut self.frames[index])
    }
}


impl VolumeSource for InMemoryVolume {
    #[allow(clippy::cast_possible_truncation)]
    fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    fn get_extents(&mut self, frame_id: u32) -> Result<BoundingBox> {
        let index = self.index(frame_id)?;
        Ok(self.frames[index].metadata.geometry().bounding_box())
    }

    fn get_metadata(&mut self, frame_id: u32) -> Result<VolumeMetadata> {
        let index = self.index(frame_id)?;
        Ok(self.frames[index].metadata.clone())
    }

    fn get_data(&mut self, frame_id: u32) -> Result<VolumeIdentity> {
        self.loaded = self.index(frame_id)?;
        Ok(VolumeIdentity::new(self.frames[self.loaded].hash, frame_id))
    }

    fn data(&self) -> &[u8] {
        self.frames
            .get(self.loaded)
            .map_or(&[], |frame| frame.data.as_slice())
    }
}
