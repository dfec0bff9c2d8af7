// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for token budgeting, device sharing and timeouts

pub mod vision;

pub use vision::{BudgetConfig, CapabilityConfig, CapabilityConfigs, TimeoutConfig, VisionConfig};
