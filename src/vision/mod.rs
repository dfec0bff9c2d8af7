// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing for edge accelerators
//!
//! This module provides:
//! - Token budgeting and resizing for vision-language model input
//! - Exclusive-access arbitration for TPU/VPU devices
//! - The detection backend contract
//! - Scene analysis across objects, classification, faces and text

pub mod annotate;
pub mod arbiter;
pub mod backend;
pub mod budget;
pub mod detection;
pub mod image_utils;
pub mod scene;

pub use arbiter::{AcceleratorArbiter, AcceleratorHandle, DeviceSession, DeviceStats};
pub use backend::{BackendRegistry, BackendStatus, DetectionBackend};
pub use budget::{
    BudgetOptimizer, GeometricScaler, ImageDimensions, OptimizationAttempt, OptimizationReport,
    TokenEstimator,
};
pub use detection::{
    all_capabilities, filter_detections, BoundingBox, Capability, CapabilitySet, Detection,
    DetectionKind,
};
pub use image_utils::{decode_image_bytes, detect_format, ImageError};
pub use scene::{CapabilityOutcome, SceneOrchestrator, SceneResponse, SceneResult};
