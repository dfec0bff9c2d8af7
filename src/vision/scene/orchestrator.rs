// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Scene orchestrator
//!
//! One request flows through: decode, fit to the token budget, fan out to
//! every requested capability concurrently, merge, annotate, summarize.
//!
//! Each capability runs in its own task. The orchestrator waits for the
//! task to get past device acquisition (bounded by the arbiter's acquire
//! timeout) and then gives it the backend timeout. A timed-out task is
//! detached rather than aborted so it can finish and release its device.

use bytes::Bytes;
use futures::future::join_all;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::result::{CapabilityOutcome, SceneResult};
use super::summary::summarize;
use crate::config::{CapabilityConfigs, VisionConfig};
use crate::error::{CapabilityError, VisionError};
use crate::vision::annotate::annotate_scene;
use crate::vision::arbiter::AcceleratorArbiter;
use crate::vision::backend::{BackendRegistry, BackendStatus, DetectionBackend};
use crate::vision::budget::BudgetOptimizer;
use crate::vision::detection::{filter_detections, Capability, CapabilitySet, Detection};
use crate::vision::image_utils::{decode_image_bytes, encode_png};

type CapabilityTask = JoinHandle<Result<Vec<Detection>, CapabilityError>>;

/// Fans a single image out to the detection backends and merges the results
pub struct SceneOrchestrator {
    optimizer: BudgetOptimizer,
    arbiter: Arc<AcceleratorArbiter>,
    backends: BackendRegistry,
    capabilities: CapabilityConfigs,
    backend_timeout: Duration,
}

impl SceneOrchestrator {
    /// Build an orchestrator with its own arbiter over the configured devices
    pub fn new(config: &VisionConfig, backends: BackendRegistry) -> Self {
        let arbiter = Arc::new(AcceleratorArbiter::from_config(config));
        Self::with_arbiter(config, backends, arbiter)
    }

    /// Build an orchestrator sharing an existing arbiter
    pub fn with_arbiter(
        config: &VisionConfig,
        backends: BackendRegistry,
        arbiter: Arc<AcceleratorArbiter>,
    ) -> Self {
        for capability in Capability::ALL {
            if let Some(device) = config.capabilities.device_for(capability) {
                if !arbiter.has_device(device) {
                    warn!(
                        "Capability {} mapped to device {} which the arbiter does not manage",
                        capability, device
                    );
                }
            }
        }

        info!(
            "Scene orchestrator ready with {} backend(s): {:?}",
            backends.len(),
            backends.capabilities()
        );

        Self {
            optimizer: BudgetOptimizer::from_config(&config.budget),
            arbiter,
            backends,
            capabilities: config.capabilities.clone(),
            backend_timeout: config.timeouts.backend(),
        }
    }

    pub fn arbiter(&self) -> &Arc<AcceleratorArbiter> {
        &self.arbiter
    }

    pub fn optimizer(&self) -> &BudgetOptimizer {
        &self.optimizer
    }

    /// Analyze encoded image bytes with the requested capabilities
    ///
    /// Only an undecodable image or an unusable budget fails the whole call.
    /// Everything past that is reported per capability.
    pub async fn analyze(
        &self,
        image_bytes: &[u8],
        capabilities: &CapabilitySet,
    ) -> Result<SceneResult, VisionError> {
        let owned = image_bytes.to_vec();
        let (image, info) =
            blocking(move || decode_image_bytes(&owned).map_err(VisionError::from)).await?;
        debug!(
            "Decoded {:?} image {}x{} ({} bytes)",
            info.format, info.width, info.height, info.size_bytes
        );
        self.analyze_image(image, capabilities).await
    }

    /// Analyze an already decoded image
    pub async fn analyze_image(
        &self,
        image: DynamicImage,
        capabilities: &CapabilitySet,
    ) -> Result<SceneResult, VisionError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let optimizer = self.optimizer.clone();
        let (optimized, optimization, payload) = blocking(move || {
            let (optimized, optimization) = optimizer.optimize(&image)?;
            let payload = encode_png(&optimized)?;
            Ok((optimized, optimization, payload))
        })
        .await?;
        let payload = Bytes::from(payload);

        info!(
            "[{}] Scene analysis: {} capability(ies) at {} ({} tokens)",
            request_id,
            capabilities.len(),
            optimization.final_size,
            optimization.final_tokens
        );

        let mut outcomes = BTreeMap::new();
        let mut pending = Vec::new();
        for &capability in capabilities {
            match self.backends.get(capability) {
                Some(backend) => {
                    let (acquired, task) = self.spawn_capability(backend, payload.clone());
                    pending.push(self.collect(request_id, capability, acquired, task));
                }
                None => {
                    warn!("[{}] No backend registered for {}", request_id, capability);
                    outcomes.insert(
                        capability,
                        CapabilityOutcome::failed(CapabilityError::Unavailable, 0),
                    );
                }
            }
        }

        for (capability, outcome) in join_all(pending).await {
            outcomes.insert(capability, outcome);
        }

        let success = outcomes.values().any(CapabilityOutcome::is_success);

        let [objects, faces, text] = [Capability::Objects, Capability::Faces, Capability::Text]
            .map(|capability| {
                outcomes
                    .get(&capability)
                    .map(|o| o.detections.clone())
                    .unwrap_or_default()
            });
        let rendered =
            blocking(move || annotate_scene(&optimized, &objects, &faces, &text)).await;
        let (annotated_image, annotation_error) = annotation_fields(request_id, rendered);

        let summary = summarize(&outcomes);

        let failed = outcomes.values().filter(|o| !o.is_success()).count();
        info!(
            "[{}] Scene analysis finished in {:?}: {} succeeded, {} failed",
            request_id,
            started.elapsed(),
            outcomes.len() - failed,
            failed
        );

        Ok(SceneResult {
            request_id,
            success,
            outcomes,
            annotated_image,
            annotation_error,
            summary,
            optimization,
        })
    }

    /// Analyze with a single capability
    pub async fn run_capability(
        &self,
        image_bytes: &[u8],
        capability: Capability,
    ) -> Result<SceneResult, VisionError> {
        let capabilities: CapabilitySet = [capability].into_iter().collect();
        self.analyze(image_bytes, &capabilities).await
    }

    /// Status of every registered backend with its configured device
    pub async fn health(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::with_capacity(self.backends.len());
        for (capability, backend) in self.backends.iter() {
            let mut status = backend.status().await;
            if status.device.is_none() {
                status.device = self
                    .capabilities
                    .device_for(*capability)
                    .map(str::to_string);
            }
            statuses.push(status);
        }
        statuses
    }

    fn spawn_capability(
        &self,
        backend: Arc<dyn DetectionBackend>,
        payload: Bytes,
    ) -> (oneshot::Receiver<()>, CapabilityTask) {
        let (acquired_tx, acquired_rx) = oneshot::channel();
        let arbiter = self.arbiter.clone();
        let device = self
            .capabilities
            .device_for(backend.capability())
            .map(str::to_string);

        let task = tokio::spawn(run_backend(arbiter, device, backend, payload, acquired_tx));
        (acquired_rx, task)
    }

    async fn collect(
        &self,
        request_id: Uuid,
        capability: Capability,
        acquired: oneshot::Receiver<()>,
        mut task: CapabilityTask,
    ) -> (Capability, CapabilityOutcome) {
        let started = Instant::now();

        // Err means the task ended before acquiring; its result is ready below
        let _ = acquired.await;

        let result = match tokio::time::timeout(self.backend_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CapabilityError::TaskFailed {
                reason: join_error.to_string(),
            }),
            Err(_) => {
                warn!(
                    "[{}] {} timed out after {:?}; letting it finish in the background",
                    request_id, capability, self.backend_timeout
                );
                Err(CapabilityError::Timeout {
                    timeout_ms: self.backend_timeout.as_millis() as u64,
                })
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let outcome = match result {
            Ok(raw) => {
                let config = self.capabilities.get(capability);
                let total = raw.len();
                let (matching, foreign): (Vec<_>, Vec<_>) =
                    raw.into_iter().partition(|d| d.kind == capability.kind());
                if !foreign.is_empty() {
                    warn!(
                        "[{}] {} backend returned {} detection(s) of another kind; dropped",
                        request_id,
                        capability,
                        foreign.len()
                    );
                }
                let detections =
                    filter_detections(matching, config.min_confidence, config.max_results);
                debug!(
                    "[{}] {}: kept {}/{} detection(s) in {}ms",
                    request_id,
                    capability,
                    detections.len(),
                    total,
                    elapsed_ms
                );
                CapabilityOutcome::succeeded(detections, elapsed_ms)
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", request_id, capability, e);
                CapabilityOutcome::failed(e, elapsed_ms)
            }
        };

        (capability, outcome)
    }
}

/// Run CPU-bound image work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T, VisionError>
where
    F: FnOnce() -> Result<T, VisionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| VisionError::TaskFailed(e.to_string()))?
}

/// Annotation outcome as result fields; a render failure never fails the scene
fn annotation_fields(
    request_id: Uuid,
    rendered: Result<Vec<u8>, VisionError>,
) -> (Option<Vec<u8>>, Option<String>) {
    match rendered {
        Ok(png) => (Some(png), None),
        Err(e) => {
            warn!("[{}] Annotation failed: {}", request_id, e);
            (None, Some(e.to_string()))
        }
    }
}

/// Body of one capability task: hold the device (if any) across inference
async fn run_backend(
    arbiter: Arc<AcceleratorArbiter>,
    device: Option<String>,
    backend: Arc<dyn DetectionBackend>,
    payload: Bytes,
    acquired: oneshot::Sender<()>,
) -> Result<Vec<Detection>, CapabilityError> {
    let mut handle = match device {
        Some(ref id) => Some(arbiter.acquire(id).await?),
        None => None,
    };
    let _ = acquired.send(());

    if let Some(handle) = handle.as_mut() {
        handle.ensure_model(backend.model_name());
    }

    let result = backend.infer(payload).await;

    if let Some(handle) = handle.as_mut() {
        handle.record_inference();
    }
    drop(handle);

    result.map_err(|e| CapabilityError::Backend { reason: e.reason })
}
