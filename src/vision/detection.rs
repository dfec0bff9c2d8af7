// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection data model shared by all backends

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One independently invocable detection task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Objects,
    Classification,
    Faces,
    Text,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Objects,
        Capability::Classification,
        Capability::Faces,
        Capability::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Objects => "objects",
            Capability::Classification => "classification",
            Capability::Faces => "faces",
            Capability::Text => "text",
        }
    }

    /// Detection kind this capability produces
    pub fn kind(&self) -> DetectionKind {
        match self {
            Capability::Objects => DetectionKind::Object,
            Capability::Classification => DetectionKind::Classification,
            Capability::Faces => DetectionKind::Face,
            Capability::Text => DetectionKind::TextSpan,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of capabilities enabled for one analysis
pub type CapabilitySet = BTreeSet<Capability>;

/// Every capability enabled
pub fn all_capabilities() -> CapabilitySet {
    Capability::ALL.into_iter().collect()
}

/// Detection variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Object,
    Classification,
    Face,
    TextSpan,
}

/// Axis-aligned box in pixel coordinates of the analyzed image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl BoundingBox {
    /// Build a box from two corners in any order
    pub fn from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            top: y1.min(y2),
            left: x1.min(x2),
            bottom: y1.max(y2),
            right: x1.max(x2),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// A single backend detection
///
/// For text spans `label` carries the recognized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub kind: DetectionKind,
    pub label: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl Detection {
    /// Create a detection, clamping confidence to [0, 1]
    pub fn new(kind: DetectionKind, label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            kind,
            label: label.into(),
            confidence,
            bounding_box: None,
        }
    }

    pub fn object(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self::new(DetectionKind::Object, label, confidence).with_box(bbox)
    }

    pub fn classification(label: impl Into<String>, confidence: f32) -> Self {
        Self::new(DetectionKind::Classification, label, confidence)
    }

    pub fn face(confidence: f32, bbox: BoundingBox) -> Self {
        Self::new(DetectionKind::Face, "face", confidence).with_box(bbox)
    }

    pub fn text(text: impl Into<String>, confidence: f32, bbox: Option<BoundingBox>) -> Self {
        let mut detection = Self::new(DetectionKind::TextSpan, text, confidence);
        detection.bounding_box = bbox;
        detection
    }

    pub fn with_box(mut self, bbox: BoundingBox) -> Self {
        self.bounding_box = Some(bbox);
        self
    }
}

/// Apply confidence floor and result cap, highest confidence first
pub fn filter_detections(
    mut detections: Vec<Detection>,
    min_confidence: f32,
    max_results: Option<usize>,
) -> Vec<Detection> {
    detections.retain(|d| d.confidence >= min_confidence);
    if let Some(max) = max_results {
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(max);
    }
    detections
}
