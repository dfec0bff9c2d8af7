// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision token budgeting
//!
//! Components:
//! - `estimator` - Tile-based vision token estimate for an image size
//! - `scaler` - Geometric rescale toward a token target
//! - `optimizer` - Descending-budget retry loop producing a resized image

pub mod estimator;
pub mod optimizer;
pub mod scaler;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::VisionError;

pub use estimator::{ImageInfo, TokenEstimator};
pub use optimizer::{BudgetOptimizer, OptimizationAttempt, OptimizationReport};
pub use scaler::GeometricScaler;

/// Width and height of an image in pixels, both positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Result<Self, VisionError> {
        if width == 0 || height == 0 {
            return Err(VisionError::InvalidImage(format!(
                "image dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn of(image: &image::DynamicImage) -> Result<Self, VisionError> {
        Self::new(image.width(), image.height())
    }
}

impl fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
