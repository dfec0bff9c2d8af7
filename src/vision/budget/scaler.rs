// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Geometric rescaling toward a token target
//!
//! Token cost grows with area, so the linear scale factor that reaches a
//! target is `sqrt(target / current)`. Sides are floored, then rounded down
//! to the quantization unit; a side that would vanish is clamped to one unit.

use super::ImageDimensions;
use crate::config::BudgetConfig;
use crate::error::VisionError;

/// Pure function from (size, current tokens, target tokens) to a new size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometricScaler {
    quantization: u32,
}

impl Default for GeometricScaler {
    fn default() -> Self {
        Self::new(16)
    }
}

impl GeometricScaler {
    pub fn new(quantization: u32) -> Self {
        Self {
            quantization: quantization.max(1),
        }
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        Self::new(config.quantization)
    }

    /// Linear scale factor for a token ratio
    pub fn scale_factor(current_tokens: u32, target_tokens: u32) -> Result<f64, VisionError> {
        if current_tokens == 0 || target_tokens == 0 {
            return Err(VisionError::InvalidBudget {
                current: current_tokens,
                target: target_tokens,
            });
        }
        Ok((target_tokens as f64 / current_tokens as f64).sqrt())
    }

    /// Dimensions expected to cost about `target_tokens`
    ///
    /// Returns the input unchanged when it is already at or under target.
    pub fn target_dimensions(
        &self,
        width: u32,
        height: u32,
        current_tokens: u32,
        target_tokens: u32,
    ) -> Result<ImageDimensions, VisionError> {
        let scale = Self::scale_factor(current_tokens, target_tokens)?;
        if target_tokens >= current_tokens {
            return ImageDimensions::new(width, height);
        }

        let new_width = self.quantize((width as f64 * scale).floor() as u32);
        let new_height = self.quantize((height as f64 * scale).floor() as u32);

        ImageDimensions::new(new_width, new_height)
    }

    fn quantize(&self, side: u32) -> u32 {
        let q = (side / self.quantization) * self.quantization;
        if q == 0 {
            self.quantization
        } else {
            q
        }
    }
}
