// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multi-capability scene analysis

pub mod orchestrator;
pub mod result;
pub mod summary;

pub use orchestrator::SceneOrchestrator;
pub use result::{CapabilityOutcome, SceneResponse, SceneResult};
pub use summary::{summarize, NO_CONTENT_SUMMARY};
