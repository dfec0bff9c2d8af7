// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy for the vision node
//!
//! `VisionError` is raised for failures that abort a request or indicate a
//! programming error. Failures scoped to a single capability inside a scene
//! analysis are recorded as `CapabilityError` values instead of being raised.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vision::image_utils::ImageError;

/// Errors raised by the budgeting and orchestration core
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Invalid token budget: current={current}, target={target}")]
    InvalidBudget { current: u32, target: u32 },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Device '{device}' is busy")]
    DeviceBusy { device: String },

    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to encode image: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Image processing task failed: {0}")]
    TaskFailed(String),
}

impl From<ImageError> for VisionError {
    fn from(e: ImageError) -> Self {
        VisionError::InvalidImage(e.to_string())
    }
}

/// Failure reported by a detection backend's inference call
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{reason}")]
pub struct BackendError {
    pub reason: String,
}

impl BackendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Failure recorded against a single capability of a scene analysis
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityError {
    #[error("device '{device}' busy")]
    DeviceBusy { device: String },

    #[error("backend failed: {reason}")]
    Backend { reason: String },

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("no backend registered")]
    Unavailable,

    #[error("task failed: {reason}")]
    TaskFailed { reason: String },
}

impl From<VisionError> for CapabilityError {
    fn from(e: VisionError) -> Self {
        match e {
            VisionError::DeviceBusy { device } => CapabilityError::DeviceBusy { device },
            VisionError::Backend(err) => CapabilityError::Backend { reason: err.reason },
            other => CapabilityError::TaskFailed {
                reason: other.to_string(),
            },
        }
    }
}
