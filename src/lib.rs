// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod error;
pub mod vision;

// Re-export main types
pub use config::VisionConfig;
pub use error::{BackendError, CapabilityError, ConfigError, VisionError};
pub use vision::{
    AcceleratorArbiter, BackendRegistry, BudgetOptimizer, Capability, Detection,
    DetectionBackend, SceneOrchestrator, SceneResult, TokenEstimator,
};
