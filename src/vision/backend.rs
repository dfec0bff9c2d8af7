// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection backend contract
//!
//! Inference engines (TPU object detector and classifier, VPU face detector,
//! CPU OCR) live outside this crate and plug in through `DetectionBackend`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::BackendError;
use crate::vision::detection::{Capability, Detection};

/// Availability report for one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub capability: Capability,
    pub model: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single capability's inference engine
///
/// Given the same bytes on the same device generation, `infer` must return
/// the same detections.
#[async_trait]
pub trait DetectionBackend: Send + Sync {
    /// Capability this backend serves
    fn capability(&self) -> Capability;

    /// Model identifier, used for device session loading
    fn model_name(&self) -> &str;

    /// Run inference on an encoded image
    async fn infer(&self, image: Bytes) -> Result<Vec<Detection>, BackendError>;

    /// Health report; backends override this to surface load failures
    async fn status(&self) -> BackendStatus {
        BackendStatus {
            capability: self.capability(),
            model: self.model_name().to_string(),
            available: true,
            device: None,
            error: None,
        }
    }
}

/// Backends keyed by capability, at most one per capability
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<Capability, Arc<dyn DetectionBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one for its capability
    pub fn register(&mut self, backend: Arc<dyn DetectionBackend>) -> &mut Self {
        let capability = backend.capability();
        if self.backends.insert(capability, backend).is_some() {
            tracing::warn!("Replacing backend for capability {}", capability);
        }
        self
    }

    pub fn with(mut self, backend: Arc<dyn DetectionBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, capability: Capability) -> Option<Arc<dyn DetectionBackend>> {
        self.backends.get(&capability).cloned()
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.backends.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Capability, &Arc<dyn DetectionBackend>)> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
