// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Natural-language scene summary

use std::collections::{BTreeMap, HashSet};

use super::result::CapabilityOutcome;
use crate::vision::detection::{Capability, Detection};

/// Summary used when no capability produced anything
pub const NO_CONTENT_SUMMARY: &str = "No notable content detected";

/// Object labels listed by name before collapsing to "and more"
const MAX_LISTED_OBJECTS: usize = 3;

/// Characters of recognized text quoted in the summary
const TEXT_EXCERPT_CHARS: usize = 100;

/// Build a one-paragraph description from the merged outcomes
pub fn summarize(outcomes: &BTreeMap<Capability, CapabilityOutcome>) -> String {
    let detections = |capability: Capability| -> &[Detection] {
        outcomes
            .get(&capability)
            .filter(|o| o.is_success())
            .map(|o| o.detections.as_slice())
            .unwrap_or(&[])
    };

    let mut parts = Vec::new();

    if let Some(top) = detections(Capability::Classification)
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    {
        parts.push(format!(
            "This appears to be {} ({:.1}% confident)",
            top.label,
            top.confidence * 100.0
        ));
    }

    let objects = detections(Capability::Objects);
    if !objects.is_empty() {
        let labels = distinct_labels(objects);
        if labels.len() <= MAX_LISTED_OBJECTS {
            parts.push(format!("I can see: {}", labels.join(", ")));
        } else {
            parts.push(format!(
                "I can see {} objects including: {}, and more",
                objects.len(),
                labels[..MAX_LISTED_OBJECTS].join(", ")
            ));
        }
    }

    let face_count = detections(Capability::Faces).len();
    if face_count > 0 {
        parts.push(format!(
            "{} {} detected",
            face_count,
            if face_count == 1 { "face" } else { "faces" }
        ));
    }

    let text = recognized_text(detections(Capability::Text));
    if !text.is_empty() {
        let word_count = text.split_whitespace().count();
        parts.push(format!(
            "Contains text ({} {}): {}",
            word_count,
            if word_count == 1 { "word" } else { "words" },
            excerpt(&text, TEXT_EXCERPT_CHARS)
        ));
    }

    if parts.is_empty() {
        NO_CONTENT_SUMMARY.to_string()
    } else {
        parts.join(". ")
    }
}

/// Labels in first-seen order without repeats
fn distinct_labels(detections: &[Detection]) -> Vec<&str> {
    let mut seen = HashSet::new();
    detections
        .iter()
        .map(|d| d.label.as_str())
        .filter(|label| seen.insert(*label))
        .collect()
}

/// All text spans joined in reading order
fn recognized_text(spans: &[Detection]) -> String {
    spans
        .iter()
        .map(|d| d.label.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}
