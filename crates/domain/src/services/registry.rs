//! Device registry: a fast key-value view of every known device.
//!
//! Keyed by hardware address with a secondary device-id index. The
//! catalog collaborator is the source of truth for a device's
//! existence; telemetry can only update devices the catalog has
//! registered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::alert::StatusDecision;
use crate::models::device::{CatalogDevice, DeviceSnapshot, TelemetryReading};

/// Registry operation errors.
///
/// `NotFound` is an expected outcome ("device unknown"), never logged
/// as an error. `Unavailable` means the backing store is transiently
/// unreachable; callers degrade to a no-op for the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("device not found")]
    NotFound,

    #[error("registry unavailable")]
    Unavailable,
}

/// Registry of device snapshots, one per hardware address.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Register a device or overwrite its control fields. Derived state
    /// and last telemetry survive catalog updates.
    async fn upsert_from_catalog(&self, device: &CatalogDevice) -> Result<(), RegistryError>;

    /// Merge a telemetry reading into an existing snapshot, refreshing
    /// `last_seen`. Fails with `NotFound` when the address was never
    /// registered; telemetry cannot create a device. Returns the
    /// snapshot after the merge.
    async fn merge_telemetry(
        &self,
        address: &str,
        reading: &TelemetryReading,
    ) -> Result<DeviceSnapshot, RegistryError>;

    /// Overwrite only the derived (state, severity) pair.
    async fn set_status(&self, address: &str, status: StatusDecision)
        -> Result<(), RegistryError>;

    /// Look up a snapshot by hardware address.
    async fn get(&self, address: &str) -> Result<DeviceSnapshot, RegistryError>;

    /// Look up a snapshot through the device-id index. A stale index
    /// entry reports `NotFound`: callers treat it as "device unknown".
    async fn get_by_id(&self, device_id: Uuid) -> Result<DeviceSnapshot, RegistryError>;

    /// Delete a snapshot and its index entry.
    async fn remove(&self, device_id: Uuid) -> Result<(), RegistryError>;

    /// All snapshots at the time of the call. The returned list is a
    /// copy, safe to iterate while the registry keeps mutating.
    async fn list_all(&self) -> Result<Vec<DeviceSnapshot>, RegistryError>;
}

#[derive(Default)]
struct Maps {
    by_address: HashMap<String, DeviceSnapshot>,
    id_index: HashMap<Uuid, String>,
}

/// In-process registry: one map keyed by address plus an id-to-address
/// index, always mutated together under one lock.
///
/// `set_available(false)` simulates a backing-store outage so callers'
/// degradation paths can be exercised in tests.
pub struct InMemoryRegistry {
    maps: RwLock<Maps>,
    available: AtomicBool,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backing store going down (or recovering).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Force a snapshot's `last_seen`, for idle-sweep tests.
    pub async fn force_last_seen(&self, address: &str, last_seen: Option<i64>) {
        let mut maps = self.maps.write().await;
        if let Some(snapshot) = maps.by_address.get_mut(address) {
            snapshot.last_seen = last_seen;
        }
    }

    fn check_available(&self) -> Result<(), RegistryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::Unavailable)
        }
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryRegistry {
    async fn upsert_from_catalog(&self, device: &CatalogDevice) -> Result<(), RegistryError> {
        self.check_available()?;
        let mut maps = self.maps.write().await;

        // Re-provisioned hardware: if this id pointed at another
        // address, drop the stale snapshot to keep the index honest.
        if let Some(old_address) = maps.id_index.get(&device.device_id).cloned() {
            if old_address != device.address {
                maps.by_address.remove(&old_address);
            }
        }

        match maps.by_address.get_mut(&device.address) {
            Some(snapshot) => snapshot.apply_catalog(device),
            None => {
                let snapshot = DeviceSnapshot::from_catalog(device, Utc::now().timestamp());
                maps.by_address.insert(device.address.clone(), snapshot);
            }
        }
        maps.id_index
            .insert(device.device_id, device.address.clone());
        Ok(())
    }

    async fn merge_telemetry(
        &self,
        address: &str,
        reading: &TelemetryReading,
    ) -> Result<DeviceSnapshot, RegistryError> {
        self.check_available()?;
        let mut maps = self.maps.write().await;
        let snapshot = maps
            .by_address
            .get_mut(address)
            .ok_or(RegistryError::NotFound)?;
        snapshot.apply_telemetry(reading, Utc::now().timestamp());
        Ok(snapshot.clone())
    }

    async fn set_status(
        &self,
        address: &str,
        status: StatusDecision,
    ) -> Result<(), RegistryError> {
        self.check_available()?;
        let mut maps = self.maps.write().await;
        let snapshot = maps
            .by_address
            .get_mut(address)
            .ok_or(RegistryError::NotFound)?;
        snapshot.status = Some(status);
        Ok(())
    }

    async fn get(&self, address: &str) -> Result<DeviceSnapshot, RegistryError> {
        self.check_available()?;
        let maps = self.maps.read().await;
        maps.by_address
            .get(address)
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    async fn get_by_id(&self, device_id: Uuid) -> Result<DeviceSnapshot, RegistryError> {
        self.check_available()?;
        let maps = self.maps.read().await;
        let address = maps.id_index.get(&device_id).ok_or(RegistryError::NotFound)?;
        maps.by_address
            .get(address)
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    async fn remove(&self, device_id: Uuid) -> Result<(), RegistryError> {
        self.check_available()?;
        let mut maps = self.maps.write().await;
        let address = maps
            .id_index
            .remove(&device_id)
            .ok_or(RegistryError::NotFound)?;
        maps.by_address.remove(&address);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<DeviceSnapshot>, RegistryError> {
        self.check_available()?;
        let maps = self.maps.read().await;
        Ok(maps.by_address.values().cloned().collect())
    }
}
