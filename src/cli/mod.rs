// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod budget;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::info;

use crate::config::VisionConfig;

/// Fabstir Vision Node CLI
#[derive(Parser, Debug)]
#[command(name = "fabstir-vision")]
#[command(version = "0.1.0")]
#[command(about = "Vision token budgeting tools for the Fabstir Vision Node", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (VISION_* env vars still override it)
    #[arg(long, global = true, env = "VISION_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show dimensions, token estimate and budget verdict for an image
    Info(budget::InfoArgs),

    /// Resize an image to fit the token budget sequence
    Optimize(budget::OptimizeArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Info(args) => budget::show_info(args, &config).await,
        Commands::Optimize(args) => budget::optimize_image(args, &config).await,
    }
}

/// Defaults, then the config file if given, then environment overrides
pub fn load_config(path: Option<&str>) -> Result<VisionConfig> {
    let config = match path {
        Some(path) => {
            info!("Loading vision config from {}", path);
            let mut config = VisionConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", Path::new(path).display()))?;
            config.apply_env();
            config
        }
        None => VisionConfig::from_env(),
    };
    config.validate().context("invalid vision configuration")?;
    Ok(config)
}
