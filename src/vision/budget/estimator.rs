// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tile-based vision token estimation
//!
//! The image is covered by square tiles of `tile_size` pixels; each tile
//! costs `tokens_per_tile`. Inputs spanning more than
//! `overhead_tile_threshold` tiles pay a flat multiplier for positional
//! encoding overhead.

use serde::{Deserialize, Serialize};

use super::ImageDimensions;
use crate::config::BudgetConfig;

/// Pure function from image size to estimated token cost
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEstimator {
    tile_size: u32,
    tokens_per_tile: u32,
    overhead_multiplier: f64,
    overhead_tile_threshold: u32,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}

impl TokenEstimator {
    pub fn from_config(config: &BudgetConfig) -> Self {
        Self {
            tile_size: config.tile_size.max(1),
            tokens_per_tile: config.tokens_per_tile,
            overhead_multiplier: config.overhead_multiplier,
            overhead_tile_threshold: config.overhead_tile_threshold,
        }
    }

    /// Number of tiles covering the image
    pub fn tiles(&self, width: u32, height: u32) -> u64 {
        let tiles_x = width.div_ceil(self.tile_size) as u64;
        let tiles_y = height.div_ceil(self.tile_size) as u64;
        tiles_x.saturating_mul(tiles_y)
    }

    /// Estimated token cost for `width` x `height`
    ///
    /// Callers must reject zero-sized images first.
    pub fn estimate(&self, width: u32, height: u32) -> u32 {
        let total_tiles = self.tiles(width, height);
        let base = total_tiles.saturating_mul(self.tokens_per_tile as u64);

        let tokens = if total_tiles > self.overhead_tile_threshold as u64 {
            (base as f64 * self.overhead_multiplier) as u64
        } else {
            base
        };

        tokens.min(u32::MAX as u64) as u32
    }

    pub fn estimate_dimensions(&self, dims: ImageDimensions) -> u32 {
        self.estimate(dims.width, dims.height)
    }

    /// Size, estimate and budget verdict for an image
    pub fn inspect(&self, dims: ImageDimensions, budget: u32) -> ImageInfo {
        let estimated_tokens = self.estimate_dimensions(dims);
        ImageInfo {
            width: dims.width,
            height: dims.height,
            estimated_tokens,
            within_budget: estimated_tokens <= budget,
            recommended_resize: estimated_tokens > budget,
        }
    }
}

/// Token-budget view of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub estimated_tokens: u32,
    pub within_budget: bool,
    pub recommended_resize: bool,
}
