// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision node configuration
//!
//! Loaded from a TOML file with `[budget]`, `[capabilities.<name>]` and
//! `[timeouts]` tables, then overridden from `VISION_*` environment
//! variables. Every field has a default so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::vision::detection::Capability;

/// Token estimation and budget settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Edge length of one estimation tile in pixels
    pub tile_size: u32,
    /// Token cost of one tile
    pub tokens_per_tile: u32,
    /// Multiplier applied to multi-tile images
    pub overhead_multiplier: f64,
    /// Tile count above which the multiplier applies
    pub overhead_tile_threshold: u32,
    /// Resized sides are rounded down to a multiple of this
    pub quantization: u32,
    /// Target budgets, most generous first
    pub budgets: Vec<u32>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            tile_size: 512,
            tokens_per_tile: 400,
            overhead_multiplier: 1.2,
            overhead_tile_threshold: 4,
            quantization: 16,
            budgets: vec![3500, 2800, 2000],
        }
    }
}

/// Per-capability routing and result filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Physical device the backend runs on; `None` for CPU paths
    pub device: Option<String>,
    /// Detections below this confidence are dropped
    pub min_confidence: f32,
    /// Keep at most this many detections (highest confidence first)
    pub max_results: Option<usize>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            device: None,
            min_confidence: 0.0,
            max_results: None,
        }
    }
}

/// Capability table, one entry per capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfigs {
    pub objects: CapabilityConfig,
    pub classification: CapabilityConfig,
    pub faces: CapabilityConfig,
    pub text: CapabilityConfig,
}

impl Default for CapabilityConfigs {
    fn default() -> Self {
        Self {
            objects: CapabilityConfig {
                device: Some("coral".to_string()),
                min_confidence: 0.3,
                max_results: None,
            },
            classification: CapabilityConfig {
                device: Some("coral".to_string()),
                min_confidence: 0.0,
                max_results: Some(3),
            },
            faces: CapabilityConfig {
                device: Some("ncs2".to_string()),
                min_confidence: 0.5,
                max_results: None,
            },
            text: CapabilityConfig::default(),
        }
    }
}

impl CapabilityConfigs {
    pub fn get(&self, capability: Capability) -> &CapabilityConfig {
        match capability {
            Capability::Objects => &self.objects,
            Capability::Classification => &self.classification,
            Capability::Faces => &self.faces,
            Capability::Text => &self.text,
        }
    }

    /// Device the capability is mapped to, if it needs arbitration
    pub fn device_for(&self, capability: Capability) -> Option<&str> {
        self.get(capability).device.as_deref()
    }

    /// Every distinct physical device referenced by the table
    pub fn device_ids(&self) -> BTreeSet<String> {
        Capability::ALL
            .iter()
            .filter_map(|c| self.get(*c).device.clone())
            .collect()
    }
}

/// Timeouts for device acquisition and backend calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub acquire_ms: u64,
    pub backend_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            acquire_ms: 5_000,
            backend_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn acquire(&self) -> Duration {
        Duration::from_millis(self.acquire_ms)
    }

    pub fn backend(&self) -> Duration {
        Duration::from_millis(self.backend_ms)
    }
}

/// Top-level vision node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub budget: BudgetConfig,
    pub capabilities: CapabilityConfigs,
    pub timeouts: TimeoutConfig,
}

impl VisionConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: VisionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden from the process environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `VISION_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override fields from an arbitrary key lookup
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "VISION_TILE_SIZE") {
            self.budget.tile_size = v;
        }
        if let Some(v) = parse_var(&lookup, "VISION_TOKENS_PER_TILE") {
            self.budget.tokens_per_tile = v;
        }
        if let Some(v) = parse_var(&lookup, "VISION_OVERHEAD_MULTIPLIER") {
            self.budget.overhead_multiplier = v;
        }
        if let Some(v) = parse_var(&lookup, "VISION_OVERHEAD_TILE_THRESHOLD") {
            self.budget.overhead_tile_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "VISION_QUANTIZATION") {
            self.budget.quantization = v;
        }
        if let Some(raw) = lookup("VISION_TOKEN_BUDGETS") {
            let parsed: Result<Vec<u32>, _> =
                raw.split(',').map(|s| s.trim().parse::<u32>()).collect();
            match parsed {
                Ok(budgets) => self.budget.budgets = budgets,
                Err(e) => warn!("Ignoring VISION_TOKEN_BUDGETS='{}': {}", raw, e),
            }
        }
        if let Some(v) = parse_var(&lookup, "VISION_ACQUIRE_TIMEOUT_MS") {
            self.timeouts.acquire_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "VISION_BACKEND_TIMEOUT_MS") {
            self.timeouts.backend_ms = v;
        }
    }

    /// Validate all fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.budget;
        if b.tile_size == 0 {
            return Err(ConfigError::invalid("budget.tile_size", "must be positive"));
        }
        if b.tokens_per_tile == 0 {
            return Err(ConfigError::invalid(
                "budget.tokens_per_tile",
                "must be positive",
            ));
        }
        if !(b.overhead_multiplier >= 1.0) {
            return Err(ConfigError::invalid(
                "budget.overhead_multiplier",
                format!("must be >= 1.0, got {}", b.overhead_multiplier),
            ));
        }
        if b.quantization == 0 {
            return Err(ConfigError::invalid("budget.quantization", "must be positive"));
        }
        if b.budgets.is_empty() {
            return Err(ConfigError::invalid("budget.budgets", "must not be empty"));
        }
        if b.budgets.contains(&0) {
            return Err(ConfigError::invalid("budget.budgets", "budgets must be positive"));
        }
        if b.budgets.windows(2).any(|w| w[1] >= w[0]) {
            return Err(ConfigError::invalid(
                "budget.budgets",
                format!("must be strictly decreasing, got {:?}", b.budgets),
            ));
        }

        for capability in Capability::ALL {
            let cap = self.capabilities.get(capability);
            if !(0.0..=1.0).contains(&cap.min_confidence) {
                return Err(ConfigError::invalid(
                    &format!("capabilities.{}.min_confidence", capability),
                    format!("must be within [0, 1], got {}", cap.min_confidence),
                ));
            }
            if cap.max_results == Some(0) {
                return Err(ConfigError::invalid(
                    &format!("capabilities.{}.max_results", capability),
                    "must be positive when set",
                ));
            }
            if matches!(cap.device.as_deref(), Some("")) {
                return Err(ConfigError::invalid(
                    &format!("capabilities.{}.device", capability),
                    "device id must not be empty",
                ));
            }
        }

        if self.timeouts.acquire_ms == 0 || self.timeouts.backend_ms == 0 {
            return Err(ConfigError::invalid("timeouts", "timeouts must be positive"));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {}='{}': {}", key, raw, e);
            None
        }
    }
}
