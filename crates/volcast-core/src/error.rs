//! Error types for volcast.

use thiserror::Error;

use crate::metadata::{GridType, ScalarType};

/// Broad classification of a [`RaycastError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The volume, the options or the viewport cannot be rendered as given.
    Configuration,
    /// A GPU program, texture or readback could not be created.
    ResourceCreation,
    /// The volume data source is missing or never settles on the requested frame.
    DataSourceUnavailable,
    /// The transfer-function provider returned nothing usable.
    StaleProviderData,
}

/// The main error type for volcast operations.
#[derive(Error, Debug)]
pub enum RaycastError {
    /// The volume grid is not cartesian.
    #[error("unsupported grid type {0:?}: only cartesian grids can be raycast")]
    UnsupportedGridType(GridType),

    /// The scalar type / length pair has no GPU texture format.
    #[error("unsupported scalar format: {scalar_type:?} with {length} byte(s) per voxel")]
    UnsupportedScalarFormat {
        scalar_type: ScalarType,
        length: u32,
    },

    /// A mode index outside of Integration / Isosurface / Aggregate.
    #[error("invalid raycast mode {0}")]
    InvalidMode(u32),

    /// A resolution component that makes voxel spacing undefined.
    #[error("degenerate volume resolution {0:?}")]
    DegenerateResolution([u32; 3]),

    /// The viewport has a zero dimension.
    #[error("invalid viewport {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    /// An option value is out of its valid range.
    #[error("invalid option '{name}': {reason}")]
    InvalidOption { name: &'static str, reason: String },

    /// The raw voxel buffer does not match the metadata.
    #[error("volume data size mismatch: expected {expected} bytes, got {actual}")]
    DataSizeMismatch { expected: usize, actual: usize },

    /// Program compilation or GPU allocation failed.
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    /// The program does not declare a uniform the pipeline needs to set.
    #[error("shader parameter '{0}' not found")]
    MissingShaderParameter(String),

    /// Reading a render target back to the CPU failed.
    #[error("readback failed: {0}")]
    Readback(String),

    /// No volume data source is connected.
    #[error("no volume data source connected")]
    NoDataSource,

    /// The data source did not settle on the requested frame in time.
    #[error("volume source did not settle on frame {requested} after {attempts} attempts")]
    FrameSyncTimeout { requested: u32, attempts: u32 },

    /// A data source call reported failure.
    #[error("volume data source error: {0}")]
    DataSource(String),

    /// The transfer function could not be fetched.
    #[error("transfer function unavailable: {0}")]
    StaleTransferFunction(String),

    /// JSON (de)serialization of options failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RaycastError {
    /// Returns the broad category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedGridType(_)
            | Self::UnsupportedScalarFormat { .. }
            | Self::InvalidMode(_)
            | Self::DegenerateResolution(_)
            | Self::InvalidViewport { .. }
            | Self::InvalidOption { .. }
            | Self::DataSizeMismatch { .. }
            | Self::Json(_) => ErrorKind::Configuration,
            Self::ResourceCreation(_) | Self::MissingShaderParameter(_) | Self::Readback(_) => {
                ErrorKind::ResourceCreation
            }
            Self::NoDataSource | Self::FrameSyncTimeout { .. } | Self::DataSource(_) => {
                ErrorKind::DataSourceUnavailable
            }
            Self::StaleTransferFunction(_) => ErrorKind::StaleProviderData,
        }
    }
}

/// A specialized Result type for volcast operations.
pub type Result<T> = std::result::Result<T, RaycastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RaycastError::UnsupportedGridType(GridType::Rectilinear).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(RaycastError::InvalidMode(7).kind(), ErrorKind::Configuration);
        assert_eq!(
            RaycastError::MissingShaderParameter("isoValue".into()).kind(),
            ErrorKind::ResourceCreation
        );
        assert_eq!(
            RaycastError::FrameSyncTimeout {
                requested: 3,
                attempts: 64
            }
            .kind(),
            ErrorKind::DataSourceUnavailable
        );
        assert_eq!(RaycastError::NoDataSource.kind(), ErrorKind::DataSourceUnavailable);
        assert_eq!(
            RaycastError::StaleTransferFunction("gone".into()).kind(),
            ErrorKind::StaleProviderData
        );
    }

    #[test]
    fn test_error_messages() {
        let err = RaycastError::UnsupportedScalarFormat {
            scalar_type: ScalarType::FloatingPoint,
            length: 8,
        };
        assert_eq!(
            err.to_string(),
            "unsupported scalar format: FloatingPoint with 8 byte(s) per voxel"
        );
        let err = RaycastError::DataSizeMismatch {
            expected: 8,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "volume data size mismatch: expected 8 bytes, got 4"
        );
    }
}
