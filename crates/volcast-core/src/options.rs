//! Configuration options for the raycaster.

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::error::{RaycastError, Result};
use crate::mode::{IntegrationParams, IsosurfaceParams, RenderMode, RenderModeKind};
use crate::range::ValueRange;

/// Default bound on frame-id convergence polling of the volume source.
pub const DEFAULT_FRAME_SYNC_MAX_ATTEMPTS: u32 = 64;

/// Phong lighting parameters of the raycaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub enabled: bool,
    /// Ambient coefficient.
    pub ka: f32,
    /// Diffuse coefficient.
    pub kd: f32,
    /// Specular coefficient.
    pub ks: f32,
    pub shininess: f32,
    pub ambient_color: Vec4,
    pub specular_color: Vec4,
    pub light_color: Vec4,
    /// Surface color used by isosurface shading.
    pub material_color: Vec4,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ka: 0.1,
            kd: 0.5,
            ks: 0.4,
            shininess: 10.0,
            ambient_color: Vec4::ONE,
            specular_color: Vec4::ONE,
            light_color: Vec4::ONE,
            material_color: Vec4::new(0.95, 0.67, 0.47, 1.0),
        }
    }
}

/// User override of the scalar value range reported by the data set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeOverride {
    pub enabled: bool,
    pub min: f32,
    pub max: f32,
}

impl Default for RangeOverride {
    fn default() -> Self {
        Self {
            enabled: false,
            min: 0.0,
            max: 1.0,
        }
    }
}

/// All recognized raycaster options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaycastOptions {
    pub mode: RenderModeKind,
    /// Ray step length as a multiple of the voxel size.
    pub ray_step_ratio: f32,
    /// Integration only.
    pub opacity_threshold: f32,
    /// Isosurface only.
    pub iso_value: f32,
    /// Isosurface only.
    pub opacity: f32,
    pub lighting: LightingConfig,
    pub range_override: RangeOverride,
    /// Upper bound on polling the volume source until it reports the
    /// requested frame.
    pub frame_sync_max_attempts: u32,
}

impl Default for RaycastOptions {
    fn default() -> Self {
        Self {
            mode: RenderModeKind::Integration,
            ray_step_ratio: 1.0,
            opacity_threshold: 1.0,
            iso_value: 0.5,
            opacity: 1.0,
            lighting: LightingConfig::default(),
            range_override: RangeOverride::default(),
            frame_sync_max_attempts: DEFAULT_FRAME_SYNC_MAX_ATTEMPTS,
        }
    }
}

impl RaycastOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: RenderModeKind) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ray_step_ratio(mut self, ratio: f32) -> Self {
        self.ray_step_ratio = ratio;
        self
    }

    pub fn with_opacity_threshold(mut self, threshold: f32) -> Self {
        self.opacity_threshold = threshold;
        self
    }

    pub fn with_iso_value(mut self, iso_value: f32) -> Self {
        self.iso_value = iso_value;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_lighting(mut self, lighting: LightingConfig) -> Self {
        self.lighting = lighting;
        self
    }

    /// Forces the value range to `min..max`.
    pub fn with_range_override(mut self, min: f32, max: f32) -> Self {
        self.range_override = RangeOverride {
            enabled: true,
            min,
            max,
        };
        self
    }

    pub fn with_frame_sync_max_attempts(mut self, attempts: u32) -> Self {
        self.frame_sync_max_attempts = attempts;
        self
    }

    /// The mode with its parameter payload.
    pub fn render_mode(&self) -> RenderMode {
        match self.mode {
            RenderModeKind::Integration => RenderMode::Integration(IntegrationParams {
                opacity_threshold: self.opacity_threshold,
            }),
            RenderModeKind::Isosurface => RenderMode::Isosurface(IsosurfaceParams {
                iso_value: self.iso_value,
                opacity: self.opacity,
            }),
            RenderModeKind::Aggregate => RenderMode::Aggregate,
        }
    }

    /// The override range when enabled, otherwise `data_range`.
    pub fn value_range(&self, data_range: ValueRange) -> ValueRange {
        if self.range_override.enabled {
            ValueRange::new(self.range_override.min, self.range_override.max)
        } else {
            data_range
        }
    }

    /// Checks option values that would make raycasting ill-defined.
    pub fn validate(&self) -> Result<()> {
        if !(self.ray_step_ratio.is_finite() && self.ray_step_ratio > 0.0) {
            return Err(RaycastError::InvalidOption {
                name: "ray_step_ratio",
                reason: format!("must be positive, got {}", self.ray_step_ratio),
            });
        }
        if self.frame_sync_max_attempts == 0 {
            return Err(RaycastError::InvalidOption {
                name: "frame_sync_max_attempts",
                reason: "must allow at least one attempt".into(),
            });
        }
        let l = &self.lighting;
        for (name, value) in [("ka", l.ka), ("kd", l.kd), ("ks", l.ks), ("shininess", l.shininess)] {
            if value < 0.0 {
                return Err(RaycastError::InvalidOption {
                    name: "lighting",
                    reason: format!("{name} must not be negative, got {value}"),
                });
            }
        }
        Ok(())
    }

    /// Parses options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
