//! Scalar value ranges.

use serde::{Deserialize, Serialize};

/// A closed `[min, max]` interval of scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl ValueRange {
    #[must_use]
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Maps `value` to `[0, 1]` relative to this range. A zero-width range maps
    /// everything to 0.
    #[must_use]
    pub fn normalize(&self, value: f32) -> f32 {
        let width = self.max - self.min;
        if width.abs() <= f32::EPSILON {
            return 0.0;
        }
        ((value - self.min) / width).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn to_array(self) -> [f32; 2] {
        [self.min, self.max]
    }

    /// Range of the alpha channel over tightly packed RGBA texels.
    ///
    /// Texels with zero alpha are background (the ray missed the volume) and
    /// do not contribute. Returns `None` when every texel is background.
    #[must_use]
    pub fn of_alpha(rgba: &[f32]) -> Option<ValueRange> {
        rgba.chunks_exact(4)
            .map(|texel| texel[3])
            .filter(|&alpha| alpha > 0.0)
            .fold(None, |range, alpha| match range {
                None => Some(ValueRange::new(alpha, alpha)),
                Some(r) => Some(ValueRange::new(r.min.min(alpha), r.max.max(alpha))),
            })
    }
}
