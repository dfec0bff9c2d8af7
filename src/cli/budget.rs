// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::VisionConfig;
use crate::vision::budget::{BudgetOptimizer, ImageDimensions, TokenEstimator};
use crate::vision::image_utils::{decode_image_bytes, format_to_extension};

/// Arguments for the info command
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Image file to inspect
    pub image: PathBuf,

    /// Token budget to check against (defaults to the first configured budget)
    #[arg(long)]
    pub budget: Option<u32>,
}

/// Arguments for the optimize command
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Image file to optimize
    pub image: PathBuf,

    /// Output path (defaults to <stem>_optimized.<ext> next to the input)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Print dimensions and budget verdict as JSON
pub async fn show_info(args: InfoArgs, config: &VisionConfig) -> Result<()> {
    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let (image, _) = decode_image_bytes(&bytes)?;

    let budget = match args.budget {
        Some(budget) => budget,
        None => config
            .budget
            .budgets
            .first()
            .copied()
            .ok_or_else(|| anyhow!("no token budgets configured"))?,
    };

    let estimator = TokenEstimator::from_config(&config.budget);
    let report = estimator.inspect(ImageDimensions::of(&image)?, budget);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Resize to fit the budget, write the result and print the report
pub async fn optimize_image(args: OptimizeArgs, config: &VisionConfig) -> Result<()> {
    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let (image, image_info) = decode_image_bytes(&bytes)?;

    let optimizer = BudgetOptimizer::from_config(&config.budget);
    let (optimized, report) = optimizer.optimize(&image)?;

    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&args.image, format_to_extension(image_info.format)));

    optimized
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!("Wrote {} ({})", output.display(), report.final_size);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `<dir>/<stem>_optimized.<ext>`, keeping the input's extension if it has one
pub fn default_output_path(input: &Path, fallback_ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback_ext.to_string());
    input.with_file_name(format!("{}_optimized.{}", stem, ext))
}
