// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Scene orchestrator integration tests
//!
//! Drives the orchestrator end to end with scripted backends: partial and
//! total failure, resolution consistency, device sharing and the response
//! shape returned to callers.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use fabstir_vision_node::config::VisionConfig;
use fabstir_vision_node::error::CapabilityError;
use fabstir_vision_node::vision::image_utils::decode_image_bytes;
use fabstir_vision_node::vision::{
    all_capabilities, AcceleratorArbiter, BackendRegistry, Capability, CapabilitySet,
    SceneOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;

use super::mock_backends::{
    healthy_backends, registry_of, test_png, ConcurrencyCounters, ScriptedBackend,
};

fn config() -> VisionConfig {
    let mut config = VisionConfig::default();
    config.timeouts.acquire_ms = 2_000;
    config.timeouts.backend_ms = 2_000;
    config
}

#[tokio::test]
async fn test_face_backend_failure_is_partial() {
    let mut backends = healthy_backends();
    backends[2] = Arc::new(ScriptedBackend::failing(
        Capability::Faces,
        "vpu not enumerated",
    ));
    let orchestrator = SceneOrchestrator::new(&config(), registry_of(&backends));

    let result = orchestrator
        .analyze(&test_png(320, 240), &all_capabilities())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.failed_capabilities(), vec![Capability::Faces]);
    assert!(matches!(
        result.outcome(Capability::Faces).unwrap().error,
        Some(CapabilityError::Backend { .. })
    ));

    // Objects below the 0.3 floor are dropped
    let objects: Vec<_> = result
        .detections(Capability::Objects)
        .iter()
        .map(|d| d.label.as_str())
        .collect();
    assert_eq!(objects, vec!["person", "bicycle"]);

    // Classification capped to the top three
    assert_eq!(result.detections(Capability::Classification).len(), 3);
    assert_eq!(result.detections(Capability::Text)[0].label, "ONE WAY");

    assert_eq!(
        result.summary,
        "This appears to be street (61.0% confident). I can see: person, bicycle. \
         Contains text (2 words): ONE WAY"
    );
}

#[tokio::test]
async fn test_every_backend_sees_same_resolution() {
    let backends = healthy_backends();
    let orchestrator = SceneOrchestrator::new(&config(), registry_of(&backends));

    let result = orchestrator
        .analyze(&test_png(1600, 1200), &all_capabilities())
        .await
        .unwrap();

    let expected = (
        result.optimization.final_size.width,
        result.optimization.final_size.height,
    );
    assert_eq!(expected, (1232, 928));
    for backend in &backends {
        assert_eq!(backend.seen_sizes(), vec![expected]);
    }

    let (annotated, info) = decode_image_bytes(result.annotated_image.as_ref().unwrap()).unwrap();
    assert_eq!((info.width, info.height), expected);
    assert_eq!(annotated.width(), 1232);
}

#[tokio::test]
async fn test_face_count_in_summary() {
    let backends = healthy_backends();
    let orchestrator = SceneOrchestrator::new(&config(), registry_of(&backends));
    let capabilities: CapabilitySet = [Capability::Faces].into_iter().collect();

    let result = orchestrator
        .analyze(&test_png(200, 200), &capabilities)
        .await
        .unwrap();

    // 0.31 falls under the 0.5 face floor
    assert_eq!(result.detections(Capability::Faces).len(), 1);
    assert_eq!(result.summary, "1 face detected");
}

#[tokio::test]
async fn test_all_backends_failing() {
    let backends: Vec<_> = Capability::ALL
        .iter()
        .map(|c| Arc::new(ScriptedBackend::failing(*c, "offline")))
        .collect();
    let orchestrator = SceneOrchestrator::new(&config(), registry_of(&backends));

    let result = orchestrator
        .analyze(&test_png(64, 64), &all_capabilities())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_capabilities().len(), 4);
    assert_eq!(result.summary, "No notable content detected");
    assert!(result.annotated_image.is_some());
    assert!(result.annotation_error.is_none());
}

#[tokio::test]
async fn test_empty_registry_reports_unavailable() {
    let orchestrator = SceneOrchestrator::new(&config(), BackendRegistry::new());
    let result = orchestrator
        .analyze(&test_png(64, 64), &all_capabilities())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result
        .outcomes
        .values()
        .all(|o| o.error == Some(CapabilityError::Unavailable)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_devices() {
    let arbiter = Arc::new(AcceleratorArbiter::from_config(&config()));
    let coral = ConcurrencyCounters::default();

    let make = || {
        let backends: Vec<Arc<ScriptedBackend>> = vec![
            Arc::new(
                ScriptedBackend::ok(Capability::Objects, vec![])
                    .delay(Duration::from_millis(20))
                    .counters(&coral),
            ),
            Arc::new(
                ScriptedBackend::ok(Capability::Classification, vec![])
                    .delay(Duration::from_millis(20))
                    .counters(&coral),
            ),
        ];
        Arc::new(SceneOrchestrator::with_arbiter(
            &config(),
            registry_of(&backends),
            arbiter.clone(),
        ))
    };

    let first = make();
    let second = make();
    let image = Arc::new(test_png(128, 128));

    let a = {
        let (orchestrator, image) = (first.clone(), image.clone());
        tokio::spawn(async move { orchestrator.analyze(&image, &all_capabilities()).await })
    };
    let b = {
        let (orchestrator, image) = (second.clone(), image.clone());
        tokio::spawn(async move { orchestrator.analyze(&image, &all_capabilities()).await })
    };

    assert!(a.await.unwrap().unwrap().success);
    assert!(b.await.unwrap().unwrap().success);

    // Four coral calls across two requests, never two at once
    assert_eq!(coral.max(), 1);
    let stats = arbiter
        .stats()
        .into_iter()
        .find(|s| s.device == "coral")
        .unwrap();
    assert_eq!(stats.inferences, 4);
}

#[tokio::test]
async fn test_slow_backend_times_out_alone() {
    let mut cfg = config();
    cfg.timeouts.backend_ms = 40;
    let mut backends = healthy_backends();
    backends[3] = Arc::new(
        ScriptedBackend::ok(Capability::Text, vec![]).delay(Duration::from_millis(400)),
    );
    let orchestrator = SceneOrchestrator::new(&cfg, registry_of(&backends));

    let result = orchestrator
        .analyze(&test_png(64, 64), &all_capabilities())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.outcome(Capability::Text).unwrap().error,
        Some(CapabilityError::Timeout { timeout_ms: 40 })
    );
    assert_eq!(result.failed_capabilities(), vec![Capability::Text]);
}

#[tokio::test]
async fn test_busy_device_fails_only_its_capability() {
    let mut cfg = config();
    cfg.timeouts.acquire_ms = 50;
    let arbiter = Arc::new(AcceleratorArbiter::from_config(&cfg));
    let backends = healthy_backends();
    let orchestrator =
        SceneOrchestrator::with_arbiter(&cfg, registry_of(&backends), arbiter.clone());

    // Another workload holds the face accelerator for the whole request
    let held = arbiter.acquire("ncs2").await.unwrap();

    let result = orchestrator
        .analyze(&test_png(160, 120), &all_capabilities())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.outcome(Capability::Faces).unwrap().error,
        Some(CapabilityError::DeviceBusy {
            device: "ncs2".to_string()
        })
    );
    assert_eq!(result.failed_capabilities(), vec![Capability::Faces]);
    assert!(backends[2].seen_sizes().is_empty());
    assert_eq!(result.detections(Capability::Objects).len(), 2);
    assert_eq!(result.detections(Capability::Text).len(), 1);
    assert!(!result.summary.contains("face"));

    held.release();
    let stats = arbiter
        .stats()
        .into_iter()
        .find(|s| s.device == "ncs2")
        .unwrap();
    assert_eq!(stats.inferences, 0);
    assert_eq!(stats.busy_rejections, 1);
    assert!(!stats.in_use);
}

#[tokio::test]
async fn test_response_shape() {
    let backends = healthy_backends();
    let orchestrator = SceneOrchestrator::new(&config(), registry_of(&backends));
    let result = orchestrator
        .analyze(&test_png(96, 64), &all_capabilities())
        .await
        .unwrap();

    let response = result.to_response();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["requestId"], result.request_id.to_string());
    assert_eq!(json["success"], true);
    assert_eq!(
        json["detections"]["objects"]["detections"][0]["boundingBox"]["right"],
        60
    );
    assert_eq!(json["optimization"]["resized"], false);

    let png = STANDARD
        .decode(json["annotatedImage"].as_str().unwrap())
        .unwrap();
    let (_, info) = decode_image_bytes(&png).unwrap();
    assert_eq!((info.width, info.height), (96, 64));
}
