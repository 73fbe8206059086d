//! Raycast modes.

use serde::{Deserialize, Serialize};

use crate::error::{RaycastError, Result};

/// Parameters of integrative (front-to-back compositing) raycasting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationParams {
    /// Accumulated opacity at which a ray terminates early.
    pub opacity_threshold: f32,
}

/// Parameters of first-hit isosurface raycasting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsosurfaceParams {
    pub iso_value: f32,
    /// Surface opacity used when blending the hit over the scene.
    pub opacity: f32,
}

/// The selected raycasting technique and its own parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderMode {
    Integration(IntegrationParams),
    Isosurface(IsosurfaceParams),
    /// Per-ray aggregation mapped through the transfer function after a
    /// range readback.
    Aggregate,
}

impl RenderMode {
    #[must_use]
    pub fn kind(&self) -> RenderModeKind {
        match self {
            Self::Integration(_) => RenderModeKind::Integration,
            Self::Isosurface(_) => RenderModeKind::Isosurface,
            Self::Aggregate => RenderModeKind::Aggregate,
        }
    }

    /// Whether the compute pass samples the transfer function.
    #[must_use]
    pub fn uses_transfer_function(&self) -> bool {
        matches!(self, Self::Integration(_) | Self::Aggregate)
    }

    /// Whether a chained renderer's output is captured into an offscreen
    /// snapshot and sampled by the compute pass, instead of being drawn
    /// straight into the host framebuffer.
    #[must_use]
    pub fn snapshots_chained_output(&self) -> bool {
        matches!(self, Self::Integration(_) | Self::Aggregate)
    }

    /// Whether the compositing pass is depth tested against the scene.
    #[must_use]
    pub fn depth_tested(&self) -> bool {
        matches!(self, Self::Isosurface(_))
    }
}

/// Fieldless discriminant of [`RenderMode`], as stored in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RenderModeKind {
    #[default]
    Integration,
    Isosurface,
    Aggregate,
}

impl RenderModeKind {
    pub const ALL: [RenderModeKind; 3] = [Self::Integration, Self::Isosurface, Self::Aggregate];

    /// Converts a numeric mode (0 = Integration, 1 = Isosurface, 2 = Aggregate).
    ///
    /// # Errors
    /// Returns [`RaycastError::InvalidMode`] for any other index.
    pub fn from_index(index: u32) -> Result<Self> {
        match index {
            0 => Ok(Self::Integration),
            1 => Ok(Self::Isosurface),
            2 => Ok(Self::Aggregate),
            other => Err(RaycastError::InvalidMode(other)),
        }
    }

    #[must_use]
    pub fn to_index(self) -> u32 {
        match self {
            Self::Integration => 0,
            Self::Isosurface => 1,
            Self::Aggregate => 2,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Integration => "Integration",
            Self::Isosurface => "Isosurface",
            Self::Aggregate => "Aggregate",
        }
    }
}
