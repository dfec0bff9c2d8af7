// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Scene analysis result types

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::CapabilityError;
use crate::vision::budget::OptimizationReport;
use crate::vision::detection::{Capability, Detection};

/// What one capability produced, or why it produced nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityOutcome {
    pub detections: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CapabilityError>,
    pub elapsed_ms: u64,
}

impl CapabilityOutcome {
    pub fn succeeded(detections: Vec<Detection>, elapsed_ms: u64) -> Self {
        Self {
            detections,
            error: None,
            elapsed_ms,
        }
    }

    pub fn failed(error: CapabilityError, elapsed_ms: u64) -> Self {
        Self {
            detections: Vec::new(),
            error: Some(error),
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Merged output of one scene analysis
#[derive(Debug, Clone)]
pub struct SceneResult {
    pub request_id: Uuid,
    /// At least one capability completed without error
    pub success: bool,
    pub outcomes: BTreeMap<Capability, CapabilityOutcome>,
    /// PNG of the analyzed image with boxes drawn, if rendering succeeded
    pub annotated_image: Option<Vec<u8>>,
    pub annotation_error: Option<String>,
    pub summary: String,
    pub optimization: OptimizationReport,
}

impl SceneResult {
    pub fn outcome(&self, capability: Capability) -> Option<&CapabilityOutcome> {
        self.outcomes.get(&capability)
    }

    /// Detections for a capability, empty if it failed or was not requested
    pub fn detections(&self, capability: Capability) -> &[Detection] {
        self.outcomes
            .get(&capability)
            .map(|o| o.detections.as_slice())
            .unwrap_or(&[])
    }

    pub fn failed_capabilities(&self) -> Vec<Capability> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(c, _)| *c)
            .collect()
    }

    /// Caller-facing shape with the annotated image base64-encoded
    pub fn to_response(&self) -> SceneResponse {
        SceneResponse {
            request_id: self.request_id.to_string(),
            success: self.success,
            detections: self.outcomes.clone(),
            annotated_image: self.annotated_image.as_ref().map(|png| STANDARD.encode(png)),
            annotation_error: self.annotation_error.clone(),
            summary: self.summary.clone(),
            optimization: self.optimization.clone(),
        }
    }
}

/// Serialized scene analysis response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneResponse {
    pub request_id: String,
    pub success: bool,
    pub detections: BTreeMap<Capability, CapabilityOutcome>,
    pub annotated_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation_error: Option<String>,
    pub summary: String,
    pub optimization: OptimizationReport,
}
