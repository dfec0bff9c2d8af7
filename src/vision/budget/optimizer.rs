// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Budget optimizer: descending-budget resize loop
//!
//! Each attempt rescales from the original size and original estimate, never
//! from the previous attempt. The first attempt that lands at or under its own
//! target wins; if none does, the last (smallest) attempt is kept.
//!
//! Attempts are flat values appended to the report. Nothing in an attempt
//! points back at the report, so serializing a report is always finite.

use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{GeometricScaler, ImageDimensions, TokenEstimator};
use crate::config::BudgetConfig;
use crate::error::VisionError;

/// Snapshot of one resize attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationAttempt {
    /// 1-based position in the budget sequence
    pub attempt: usize,
    pub target_tokens: u32,
    pub original_size: ImageDimensions,
    pub new_size: ImageDimensions,
    pub tokens_before: u32,
    pub tokens_after: u32,
    pub scale_factor: f64,
    pub met_target: bool,
}

/// Outcome of budget optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub resized: bool,
    pub original_size: ImageDimensions,
    pub original_tokens: u32,
    /// Attempts in the order they ran
    pub attempts: Vec<OptimizationAttempt>,
    pub final_size: ImageDimensions,
    pub final_tokens: u32,
}

impl OptimizationReport {
    fn unchanged(size: ImageDimensions, tokens: u32) -> Self {
        Self {
            resized: false,
            original_size: size,
            original_tokens: tokens,
            attempts: Vec::new(),
            final_size: size,
            final_tokens: tokens,
        }
    }

    /// Percentage of estimated tokens saved
    pub fn token_reduction_percent(&self) -> f64 {
        if self.original_tokens == 0 {
            return 0.0;
        }
        let saved = self.original_tokens.saturating_sub(self.final_tokens) as f64;
        saved / self.original_tokens as f64 * 100.0
    }

    /// The attempt whose size was kept, if any
    pub fn selected_attempt(&self) -> Option<&OptimizationAttempt> {
        if !self.resized {
            return None;
        }
        self.attempts
            .iter()
            .find(|a| a.met_target)
            .or_else(|| self.attempts.last())
    }
}

/// Resizes images to fit a descending sequence of token budgets
#[derive(Debug, Clone)]
pub struct BudgetOptimizer {
    estimator: TokenEstimator,
    scaler: GeometricScaler,
    budgets: Vec<u32>,
}

impl Default for BudgetOptimizer {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}

impl BudgetOptimizer {
    pub fn new(estimator: TokenEstimator, scaler: GeometricScaler, budgets: Vec<u32>) -> Self {
        Self {
            estimator,
            scaler,
            budgets,
        }
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        Self::new(
            TokenEstimator::from_config(config),
            GeometricScaler::from_config(config),
            config.budgets.clone(),
        )
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn budgets(&self) -> &[u32] {
        &self.budgets
    }

    /// Plan the resize for an image size without touching pixels
    pub fn optimize_dimensions(
        &self,
        original: ImageDimensions,
    ) -> Result<OptimizationReport, VisionError> {
        let first_budget = *self.budgets.first().ok_or(VisionError::InvalidBudget {
            current: 0,
            target: 0,
        })?;

        let original_tokens = self.estimator.estimate_dimensions(original);
        if original_tokens <= first_budget {
            debug!(
                "Image {} within budget ({} <= {}), no resize needed",
                original, original_tokens, first_budget
            );
            return Ok(OptimizationReport::unchanged(original, original_tokens));
        }

        let mut attempts = Vec::with_capacity(self.budgets.len());
        for (index, &target) in self.budgets.iter().enumerate() {
            let scale_factor = GeometricScaler::scale_factor(original_tokens, target)?;
            let new_size = self.scaler.target_dimensions(
                original.width,
                original.height,
                original_tokens,
                target,
            )?;
            let tokens_after = self.estimator.estimate_dimensions(new_size);
            let met_target = tokens_after <= target;

            debug!(
                "Attempt {}: target={} {} -> {} ({} -> {} tokens, scale {:.4})",
                index + 1,
                target,
                original,
                new_size,
                original_tokens,
                tokens_after,
                scale_factor
            );

            attempts.push(OptimizationAttempt {
                attempt: index + 1,
                target_tokens: target,
                original_size: original,
                new_size,
                tokens_before: original_tokens,
                tokens_after,
                scale_factor,
                met_target,
            });

            if met_target {
                break;
            }
        }

        // Loop ran at least once since budgets is non-empty
        let chosen = attempts
            .last()
            .map(|a| (a.new_size, a.tokens_after))
            .unwrap_or((original, original_tokens));

        Ok(OptimizationReport {
            resized: chosen.0 != original,
            original_size: original,
            original_tokens,
            attempts,
            final_size: chosen.0,
            final_tokens: chosen.1,
        })
    }

    /// Resize `image` to fit the budget sequence
    pub fn optimize(
        &self,
        image: &DynamicImage,
    ) -> Result<(DynamicImage, OptimizationReport), VisionError> {
        let original = ImageDimensions::of(image)?;
        let report = self.optimize_dimensions(original)?;

        if !report.resized {
            return Ok((image.clone(), report));
        }

        let resized = image.resize_exact(
            report.final_size.width,
            report.final_size.height,
            FilterType::Triangle,
        );

        info!(
            "Image optimized: {} -> {} ({} -> {} tokens, {:.1}% reduction, {} attempt(s))",
            report.original_size,
            report.final_size,
            report.original_tokens,
            report.final_tokens,
            report.token_reduction_percent(),
            report.attempts.len()
        );

        Ok((resized, report))
    }
}
