// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Accelerator arbitration
//!
//! Each physical device gets one `tokio::sync::Mutex` guarding its
//! `DeviceSession`. Waiters are served in FIFO order. An `AcceleratorHandle`
//! is the owned guard: holding it means exclusive use of the device, and
//! dropping it (on success or failure) frees the device for the next waiter.
//!
//! CPU-only capabilities are not registered here and need no handle.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::VisionConfig;
use crate::error::VisionError;

/// Per-device state, only reachable through an `AcceleratorHandle`
#[derive(Debug)]
pub struct DeviceSession {
    device: String,
    loaded_model: Option<String>,
}

impl DeviceSession {
    fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            loaded_model: None,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn loaded_model(&self) -> Option<&str> {
        self.loaded_model.as_deref()
    }
}

#[derive(Debug)]
struct DeviceSlot {
    session: Arc<Mutex<DeviceSession>>,
    model_loads: AtomicU64,
    inferences: AtomicU64,
    busy_rejections: AtomicU64,
}

impl DeviceSlot {
    fn new(device: &str) -> Self {
        Self {
            session: Arc::new(Mutex::new(DeviceSession::new(device))),
            model_loads: AtomicU64::new(0),
            inferences: AtomicU64::new(0),
            busy_rejections: AtomicU64::new(0),
        }
    }
}

/// Usage counters for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStats {
    pub device: String,
    pub in_use: bool,
    pub loaded_model: Option<String>,
    pub model_loads: u64,
    pub inferences: u64,
    pub busy_rejections: u64,
}

/// Serializes access to exclusive-access accelerators
#[derive(Debug, Clone)]
pub struct AcceleratorArbiter {
    devices: HashMap<String, Arc<DeviceSlot>>,
    acquire_timeout: Duration,
}

impl AcceleratorArbiter {
    /// Create an arbiter for the given device ids
    pub fn new<I, S>(device_ids: I, acquire_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let devices = device_ids
            .into_iter()
            .map(|id| {
                let id = id.as_ref();
                (id.to_string(), Arc::new(DeviceSlot::new(id)))
            })
            .collect::<HashMap<_, _>>();

        info!(
            "Accelerator arbiter managing {} device(s), acquire timeout {:?}",
            devices.len(),
            acquire_timeout
        );

        Self {
            devices,
            acquire_timeout,
        }
    }

    /// Register every device referenced by the capability table
    pub fn from_config(config: &VisionConfig) -> Self {
        Self::new(
            config.capabilities.device_ids(),
            config.timeouts.acquire(),
        )
    }

    pub fn has_device(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Wait for exclusive use of `device_id` with the configured timeout
    pub async fn acquire(&self, device_id: &str) -> Result<AcceleratorHandle, VisionError> {
        self.acquire_with_timeout(device_id, self.acquire_timeout)
            .await
    }

    /// Wait for exclusive use of `device_id`, giving up after `timeout`
    pub async fn acquire_with_timeout(
        &self,
        device_id: &str,
        timeout: Duration,
    ) -> Result<AcceleratorHandle, VisionError> {
        let slot = self
            .devices
            .get(device_id)
            .ok_or_else(|| VisionError::UnknownDevice(device_id.to_string()))?
            .clone();

        let started = Instant::now();
        match tokio::time::timeout(timeout, slot.session.clone().lock_owned()).await {
            Ok(guard) => {
                debug!(
                    "Acquired device {} after {:?}",
                    device_id,
                    started.elapsed()
                );
                Ok(AcceleratorHandle {
                    guard,
                    slot,
                    acquired_at: Instant::now(),
                })
            }
            Err(_) => {
                slot.busy_rejections.fetch_add(1, Ordering::Relaxed);
                warn!("Device {} busy, gave up after {:?}", device_id, timeout);
                Err(VisionError::DeviceBusy {
                    device: device_id.to_string(),
                })
            }
        }
    }

    /// Return a device to the pool
    pub fn release(&self, handle: AcceleratorHandle) {
        handle.release();
    }

    /// Counters for every managed device, sorted by id
    pub fn stats(&self) -> Vec<DeviceStats> {
        let mut stats: Vec<DeviceStats> = self
            .devices
            .iter()
            .map(|(id, slot)| {
                let (in_use, loaded_model) = match slot.session.try_lock() {
                    Ok(session) => (false, session.loaded_model.clone()),
                    Err(_) => (true, None),
                };
                DeviceStats {
                    device: id.clone(),
                    in_use,
                    loaded_model,
                    model_loads: slot.model_loads.load(Ordering::Relaxed),
                    inferences: slot.inferences.load(Ordering::Relaxed),
                    busy_rejections: slot.busy_rejections.load(Ordering::Relaxed),
                }
            })
            .collect();
        stats.sort_by(|a, b| a.device.cmp(&b.device));
        stats
    }
}

/// Exclusive ownership of one device for the length of one inference call
#[derive(Debug)]
pub struct AcceleratorHandle {
    guard: OwnedMutexGuard<DeviceSession>,
    slot: Arc<DeviceSlot>,
    acquired_at: Instant,
}

impl AcceleratorHandle {
    pub fn device(&self) -> &str {
        &self.guard.device
    }

    pub fn session(&self) -> &DeviceSession {
        &self.guard
    }

    /// Make `model` the loaded model on this device
    ///
    /// Returns `true` when a load happened (first use, or switching away from
    /// another capability's model on a shared device).
    pub fn ensure_model(&mut self, model: &str) -> bool {
        if self.guard.loaded_model.as_deref() == Some(model) {
            return false;
        }
        match self.guard.loaded_model.replace(model.to_string()) {
            Some(previous) => info!(
                "Device {}: switching model {} -> {}",
                self.guard.device, previous, model
            ),
            None => info!("Device {}: loading model {}", self.guard.device, model),
        }
        self.slot.model_loads.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn record_inference(&mut self) {
        self.slot.inferences.fetch_add(1, Ordering::Relaxed);
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AcceleratorHandle {
    fn drop(&mut self) {
        debug!(
            "Released device {} after {:?}",
            self.guard.device,
            self.acquired_at.elapsed()
        );
    }
}
