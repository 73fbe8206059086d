//! Volume metadata and GPU format selection.

use crate::error::{RaycastError, Result};
use crate::geometry::VolumeGeometry;
use crate::range::ValueRange;

/// Grid topology of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridType {
    /// Regular grid with uniform spacing per axis.
    #[default]
    Cartesian,
    /// Axis-aligned grid with per-slice spacing.
    Rectilinear,
    /// Unstructured tetrahedral grid.
    Tetrahedral,
}

/// Scalar encoding of a voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    FloatingPoint,
    UnsignedInteger,
    SignedInteger,
    /// Bit-packed voxels. Never renderable.
    Bits,
}

/// Description of a volume frame as reported by the data source.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMetadata {
    pub grid_type: GridType,
    /// World-space position of the first grid point.
    pub origin: [f32; 3],
    /// World-space size of the grid along each axis.
    pub extents: [f32; 3],
    /// Number of grid points along each axis.
    pub resolution: [u32; 3],
    pub scalar_type: ScalarType,
    /// Bytes per scalar.
    pub scalar_length: u32,
    /// Per-component minimum values. Only component 0 is used.
    pub min_values: Vec<f64>,
    /// Per-component maximum values. Only component 0 is used.
    pub max_values: Vec<f64>,
}

impl VolumeMetadata {
    /// Creates cartesian metadata with a single component.
    #[must_use]
    pub fn cartesian(
        origin: [f32; 3],
        extents: [f32; 3],
        resolution: [u32; 3],
        scalar_type: ScalarType,
        scalar_length: u32,
        range: ValueRange,
    ) -> Self {
        Self {
            grid_type: GridType::Cartesian,
            origin,
            extents,
            resolution,
            scalar_type,
            scalar_length,
            min_values: vec![f64::from(range.min)],
            max_values: vec![f64::from(range.max)],
        }
    }

    /// Number of grid points, or `None` when it does not fit in `usize`.
    #[must_use]
    pub fn voxel_count(&self) -> Option<usize> {
        checked_voxel_count(self.resolution)
    }

    /// Expected size in bytes of the raw voxel buffer.
    ///
    /// A resolution whose byte size overflows is degenerate.
    pub fn expected_data_len(&self) -> Result<usize> {
        self.voxel_count()
            .and_then(|count| count.checked_mul(self.scalar_length as usize))
            .ok_or(RaycastError::DegenerateResolution(self.resolution))
    }

    /// Fails with [`RaycastError::DataSizeMismatch`] unless `actual` bytes
    /// is exactly the voxel buffer size.
    pub fn check_data_len(&self, actual: usize) -> Result<()> {
        let expected = self.expected_data_len()?;
        if actual != expected {
            return Err(RaycastError::DataSizeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Value range of component 0, falling back to `0..1` when absent.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn value_range(&self) -> ValueRange {
        let min = self.min_values.first().copied().unwrap_or(0.0);
        let max = self.max_values.first().copied().unwrap_or(1.0);
        ValueRange::new(min as f32, max as f32)
    }

    /// Geometry of the grid.
    #[must_use]
    pub fn geometry(&self) -> VolumeGeometry {
        VolumeGeometry::new(self.origin, self.extents, self.resolution)
    }

    /// Checks that this volume can be uploaded and returns its texture format.
    pub fn validate(&self) -> Result<VolumeFormat> {
        if self.grid_type != GridType::Cartesian {
            return Err(RaycastError::UnsupportedGridType(self.grid_type));
        }
        if self.resolution.contains(&0) {
            return Err(RaycastError::DegenerateResolution(self.resolution));
        }
        VolumeFormat::from_scalar(self.scalar_type, self.scalar_length)
    }
}

/// Identity of an uploaded volume snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VolumeIdentity {
    pub data_hash: u64,
    pub frame_id: u32,
}

impl VolumeIdentity {
    #[must_use]
    pub fn new(data_hash: u64, frame_id: u32) -> Self {
        Self {
            data_hash,
            frame_id,
        }
    }
}

/// How a shader reads texels of a volume format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Float,
    Uint,
    Sint,
}

/// Single-channel GPU texture format of an uploaded volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeFormat {
    /// 32-bit float.
    R32Float,
    /// 8-bit unsigned integer.
    R8Uint,
    /// 16-bit unsigned integer.
    R16Uint,
    /// 16-bit signed integer.
    R16Sint,
}

impl VolumeFormat {
    /// Maps a scalar type and length to a texture format.
    ///
    /// # Errors
    /// Returns [`RaycastError::UnsupportedScalarFormat`] for every pair outside
    /// float/4, unsigned/1, unsigned/2 and signed/2.
    pub fn from_scalar(scalar_type: ScalarType, length: u32) -> Result<Self> {
        match (scalar_type, length) {
            (ScalarType::FloatingPoint, 4) => Ok(Self::R32Float),
            (ScalarType::UnsignedInteger, 1) => Ok(Self::R8Uint),
            (ScalarType::UnsignedInteger, 2) => Ok(Self::R16Uint),
            (ScalarType::SignedInteger, 2) => Ok(Self::R16Sint),
            _ => Err(RaycastError::UnsupportedScalarFormat {
                scalar_type,
                length,
            }),
        }
    }

    /// Bytes per voxel.
    #[must_use]
    pub fn bytes_per_voxel(self) -> u32 {
        match self {
            Self::R32Float => 4,
            Self::R8Uint => 1,
            Self::R16Uint | Self::R16Sint => 2,
        }
    }

    #[must_use]
    pub fn sample_kind(self) -> SampleKind {
        match self {
            Self::R32Float => SampleKind::Float,
            Self::R8Uint | Self::R16Uint => SampleKind::Uint,
            Self::R16Sint => SampleKind::Sint,
        }
    }
}

/// Product of the resolution components, or `None` on overflow.
pub(crate) fn checked_voxel_count(resolution: [u32; 3]) -> Option<usize> {
    resolution
        .iter()
        .try_fold(1usize, |count, &r| count.checked_mul(r as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SUPPORTED: [(ScalarType, u32, VolumeFormat); 4] = [
        (ScalarType::FloatingPoint, 4, VolumeFormat::R32Float),
        (ScalarType::UnsignedInteger, 1, VolumeFormat::R8Uint),
        (ScalarType::UnsignedInteger, 2, VolumeFormat::R16Uint),
        (ScalarType::SignedInteger, 2, VolumeFormat::R16Sint),
    ];

    fn scalar_type_strategy() -> impl Strategy<Value = ScalarType> {
        prop_oneof![
            Just(ScalarType::FloatingPoint),
            Just(ScalarType::UnsignedInteger),
            Just(ScalarType::SignedInteger),
            Just(ScalarType::Bits),
        ]
    }

    #[test]
    fn test_supported_formats() {
        for (scalar_type, length, format) in SUPPORTED {
            assert_eq!(VolumeFormat::from_scalar(scalar_type, length).unwrap(), format);
            assert_eq!(format.bytes_per_voxel(), length);
        }
    }

    #[test]
    fn test_bits_never_supported() {
        for length in 0..16 {
            assert!(matches!(
                VolumeFormat::from_scalar(ScalarType::Bits, length),
                Err(RaycastError::UnsupportedScalarFormat { .. })
            ));
        }
    }

    proptest! {
        #[test]
        fn prop_format_mapping_total(scalar_type in scalar_type_strategy(), length in 0u32..64) {
            let expected = SUPPORTED
                .iter()
                .find(|(t, l, _)| *t == scalar_type && *l == length)
                .map(|(_, _, f)| *f);
            match VolumeFormat::from_scalar(scalar_type, length) {
                Ok(format) => prop_assert_eq!(Some(format), expected),
                Err(RaycastError::UnsupportedScalarFormat { scalar_type: t, length: l }) => {
                    prop_assert!(expected.is_none());
                    prop_assert_eq!(t, scalar_type);
                    prop_assert_eq!(l, length);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
            // deterministic
            prop_assert_eq!(
                VolumeFormat::from_scalar(scalar_type, length).ok(),
                VolumeFormat::from_scalar(scalar_type, length).ok()
            );
        }
    }

    #[test]
    fn test_validate_rejects_non_cartesian() {
        let mut meta = VolumeMetadata::cartesian(
            [0.0; 3],
            [1.0; 3],
            [2, 2, 2],
            ScalarType::FloatingPoint,
            4,
            ValueRange::new(0.0, 1.0),
        );
        assert_eq!(meta.validate().unwrap(), VolumeFormat::R32Float);

        meta.grid_type = GridType::Rectilinear;
        assert!(matches!(
            meta.validate(),
            Err(RaycastError::UnsupportedGridType(GridType::Rectilinear))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_resolution() {
        let meta = VolumeMetadata::cartesian(
            [0.0; 3],
            [1.0; 3],
            [4, 0, 4],
            ScalarType::UnsignedInteger,
            1,
            ValueRange::new(0.0, 255.0),
        );
        assert!(matches!(
            meta.validate(),
            Err(RaycastError::DegenerateResolution([4, 0, 4]))
        ));
    }

    #[test]
    fn test_expected_data_len() {
        let meta = VolumeMetadata::cartesian(
            [0.0; 3],
            [1.0; 3],
            [4, 3, 2],
            ScalarType::UnsignedInteger,
            2,
            ValueRange::new(0.0, 1.0),
        );
        assert_eq!(meta.voxel_count(), Some(24));
        assert_eq!(meta.expected_data_len().unwrap(), 48);
        assert!(meta.check_data_len(48).is_ok());
        assert!(matches!(
            meta.check_data_len(47),
            Err(RaycastError::DataSizeMismatch {
                expected: 48,
                actual: 47
            })
        ));
    }

    #[test]
    fn test_oversized_resolution_is_degenerate() {
        let huge = [1 << 22; 3];
        let meta = VolumeMetadata::cartesian(
            [0.0; 3],
            [1.0; 3],
            huge,
            ScalarType::FloatingPoint,
            4,
            ValueRange::new(0.0, 1.0),
        );
        assert_eq!(meta.voxel_count(), None);
        assert!(matches!(
            meta.expected_data_len(),
            Err(RaycastError::DegenerateResolution(r)) if r == huge
        ));
        assert!(matches!(
            meta.check_data_len(0),
            Err(RaycastError::DegenerateResolution(_))
        ));
    }
}
