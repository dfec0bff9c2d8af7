// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Budget optimizer integration tests
//!
//! Covers the full planning path (estimate, rescale, retry) through the
//! public API, plus pixel-level resizing of decoded images.

use fabstir_vision_node::config::VisionConfig;
use fabstir_vision_node::error::VisionError;
use fabstir_vision_node::vision::image_utils::decode_image_bytes;
use fabstir_vision_node::vision::{BudgetOptimizer, ImageDimensions, TokenEstimator};
use std::collections::HashMap;

use super::mock_backends::test_png;

fn dims(width: u32, height: u32) -> ImageDimensions {
    ImageDimensions::new(width, height).unwrap()
}

#[test]
fn test_large_photo_runs_whole_budget_sequence() {
    let optimizer = BudgetOptimizer::default();
    let report = optimizer.optimize_dimensions(dims(4096, 3072)).unwrap();

    assert!(report.resized);
    assert_eq!(report.original_tokens, 23040);

    let sizes: Vec<(u32, u32, u32)> = report
        .attempts
        .iter()
        .map(|a| (a.new_size.width, a.new_size.height, a.tokens_after))
        .collect();
    assert_eq!(
        sizes,
        vec![(1584, 1184, 5760), (1424, 1056, 4320), (1200, 896, 2880)]
    );
    assert!(report.attempts.iter().all(|a| !a.met_target));
    assert!(report
        .attempts
        .iter()
        .all(|a| a.original_size == dims(4096, 3072) && a.tokens_before == 23040));

    // Sequence exhausted: the smallest attempt is kept
    assert_eq!(report.final_size, dims(1200, 896));
    assert_eq!(report.final_tokens, 2880);
    assert_eq!(report.selected_attempt().unwrap().attempt, 3);
    assert_eq!(report.token_reduction_percent(), 87.5);
}

#[test]
fn test_small_photo_untouched() {
    let report = BudgetOptimizer::default()
        .optimize_dimensions(dims(1024, 768))
        .unwrap();

    assert!(!report.resized);
    assert!(report.attempts.is_empty());
    assert_eq!(report.final_size, dims(1024, 768));
    assert_eq!(report.token_reduction_percent(), 0.0);
    assert!(report.selected_attempt().is_none());
}

#[test]
fn test_first_met_budget_stops_sequence() {
    let report = BudgetOptimizer::default()
        .optimize_dimensions(dims(1600, 1200))
        .unwrap();

    assert_eq!(report.attempts.len(), 1);
    assert!(report.attempts[0].met_target);
    assert_eq!(report.final_size, dims(1232, 928));
    assert_eq!(report.final_tokens, 2880);
    assert_eq!(report.token_reduction_percent(), 50.0);
}

#[test]
fn test_final_dimensions_are_quantized() {
    let optimizer = BudgetOptimizer::default();
    for (w, h) in [(4096, 3072), (3000, 2000), (5000, 1000), (1920, 1920)] {
        let report = optimizer.optimize_dimensions(dims(w, h)).unwrap();
        if report.resized {
            assert_eq!(report.final_size.width % 16, 0, "{}x{}", w, h);
            assert_eq!(report.final_size.height % 16, 0, "{}x{}", w, h);
            assert!(report.final_tokens < report.original_tokens);
        }
    }
}

#[test]
fn test_budgets_from_environment() {
    let env: HashMap<&str, &str> = [("VISION_TOKEN_BUDGETS", "1600")].into_iter().collect();
    let mut config = VisionConfig::default();
    config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
    config.validate().unwrap();

    let optimizer = BudgetOptimizer::from_config(&config.budget);
    assert_eq!(optimizer.budgets(), &[1600]);

    let report = optimizer.optimize_dimensions(dims(2048, 2048)).unwrap();
    assert_eq!(report.original_tokens, 7680);
    assert_eq!(report.final_size, dims(928, 928));
    assert_eq!(report.final_tokens, 1600);
}

#[test]
fn test_empty_budget_list_rejected() {
    let optimizer = BudgetOptimizer::new(
        TokenEstimator::default(),
        Default::default(),
        Vec::new(),
    );
    assert!(matches!(
        optimizer.optimize_dimensions(dims(4096, 3072)),
        Err(VisionError::InvalidBudget { .. })
    ));
}

#[test]
fn test_decoded_image_resized_to_plan() {
    let (image, _) = decode_image_bytes(&test_png(1600, 1200)).unwrap();
    let (resized, report) = BudgetOptimizer::default().optimize(&image).unwrap();

    assert_eq!((resized.width(), resized.height()), (1232, 928));
    assert_eq!(ImageDimensions::of(&resized).unwrap(), report.final_size);
}

#[test]
fn test_inspect_matches_optimizer_decision() {
    let estimator = TokenEstimator::default();

    let small = estimator.inspect(dims(1024, 768), 3500);
    assert!(small.within_budget);
    assert!(!small.recommended_resize);

    let large = estimator.inspect(dims(4096, 3072), 3500);
    assert_eq!(large.estimated_tokens, 23040);
    assert!(large.recommended_resize);

    let json = serde_json::to_value(&large).unwrap();
    assert_eq!(json["estimatedTokens"], 23040);
    assert_eq!(json["withinBudget"], false);
}

#[test]
fn test_report_serializes_flat() {
    let report = BudgetOptimizer::default()
        .optimize_dimensions(dims(4096, 3072))
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["attempts"].as_array().unwrap().len(), 3);
    assert_eq!(json["attempts"][0]["newSize"]["width"], 1584);
    assert_eq!(json["finalSize"]["height"], 896);
    assert!(json["attempts"][0].get("attempts").is_none());
}
