//! Live device registry

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::device::Device;

/// Devices currently attached and accepted, keyed by session ID
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: DashMap<u32, Device>,
    live: AtomicUsize,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
            live: AtomicUsize::new(0),
        }
    }

    /// Register a device, returning the entry it replaced
    ///
    /// The live count only moves when a new session ID is added.
    pub fn insert(&self, device: Device) -> Option<Device> {
        let previous = self.devices.insert(device.id, device);
        if previous.is_none() {
            self.live.fetch_add(1, Ordering::AcqRel);
        }
        previous
    }

    /// Remove a device; absent IDs are a no-op
    pub fn remove(&self, id: u32) -> Option<Device> {
        let (_, device) = self.devices.remove(&id)?;
        self.live.fetch_sub(1, Ordering::AcqRel);
        Some(device)
    }

    pub fn get(&self, id: u32) -> Option<Device> {
        self.devices.get(&id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.devices.contains_key(&id)
    }

    /// Snapshot of all devices, ordered by session ID
    pub fn list(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.iter().map(|r| r.value().clone()).collect();
        devices.sort_by_key(|d| d.id);
        devices
    }

    /// Session IDs, ascending
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.devices.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Count maintained alongside the map for diagnostics
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
