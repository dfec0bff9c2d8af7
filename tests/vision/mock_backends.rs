// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Scriptable detection backends for integration tests

use async_trait::async_trait;
use bytes::Bytes;
use fabstir_vision_node::error::BackendError;
use fabstir_vision_node::vision::image_utils::encode_png;
use fabstir_vision_node::vision::{
    BackendRegistry, BoundingBox, Capability, Detection, DetectionBackend,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend returning a fixed response after an optional delay
///
/// Records the resolution of every payload it receives and how many calls
/// were in flight at once across all backends sharing its counters.
pub struct ScriptedBackend {
    capability: Capability,
    model: String,
    response: Result<Vec<Detection>, BackendError>,
    delay: Duration,
    seen: Mutex<Vec<(u32, u32)>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn ok(capability: Capability, detections: Vec<Detection>) -> Self {
        Self::with_response(capability, Ok(detections))
    }

    pub fn failing(capability: Capability, reason: &str) -> Self {
        Self::with_response(capability, Err(BackendError::new(reason)))
    }

    fn with_response(
        capability: Capability,
        response: Result<Vec<Detection>, BackendError>,
    ) -> Self {
        Self {
            capability,
            model: format!("{}-model", capability.as_str()),
            response,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn counters(mut self, counters: &ConcurrencyCounters) -> Self {
        self.in_flight = counters.in_flight.clone();
        self.max_in_flight = counters.max_in_flight.clone();
        self
    }

    pub fn seen_sizes(&self) -> Vec<(u32, u32)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DetectionBackend for ScriptedBackend {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn infer(&self, image: Bytes) -> Result<Vec<Detection>, BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let decoded = image::load_from_memory(&image)
            .map_err(|e| BackendError::new(format!("undecodable payload: {}", e)))?;
        self.seen
            .lock()
            .unwrap()
            .push((decoded.width(), decoded.height()));

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.response.clone()
    }
}

/// Shared in-flight counters for checking device exclusion
#[derive(Default, Clone)]
pub struct ConcurrencyCounters {
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyCounters {
    pub fn max(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub fn bbox(x1: u32, y1: u32, x2: u32, y2: u32) -> BoundingBox {
    BoundingBox::from_corners(x1, y1, x2, y2)
}

/// Registry with a healthy backend for every capability
pub fn healthy_backends() -> Vec<Arc<ScriptedBackend>> {
    vec![
        Arc::new(ScriptedBackend::ok(
            Capability::Objects,
            vec![
                Detection::object("person", 0.92, bbox(10, 10, 60, 120)),
                Detection::object("bicycle", 0.81, bbox(40, 60, 140, 130)),
                Detection::object("cone", 0.12, bbox(0, 0, 5, 5)),
            ],
        )),
        Arc::new(ScriptedBackend::ok(
            Capability::Classification,
            vec![
                Detection::classification("street", 0.61),
                Detection::classification("alley", 0.22),
                Detection::classification("plaza", 0.09),
                Detection::classification("parking lot", 0.05),
            ],
        )),
        Arc::new(ScriptedBackend::ok(
            Capability::Faces,
            vec![
                Detection::face(0.88, bbox(20, 12, 44, 40)),
                Detection::face(0.31, bbox(90, 12, 100, 22)),
            ],
        )),
        Arc::new(ScriptedBackend::ok(
            Capability::Text,
            vec![Detection::text("ONE WAY", 0.9, Some(bbox(100, 5, 150, 20)))],
        )),
    ]
}

pub fn registry_of(backends: &[Arc<ScriptedBackend>]) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for backend in backends {
        registry.register(backend.clone());
    }
    registry
}

/// Solid-colour PNG of the given size
pub fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([128, 96, 64])));
    encode_png(&img).unwrap()
}
