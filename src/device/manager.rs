//! Device registry.
//!
//! A global list keyed by [`DeviceId`]. Registration runs the device's
//! `init` hook before the device becomes visible; lookup is a linear scan.
//! There is no unregistration in the current design.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, Once};

use crate::error::{KernelError, Result};
use crate::kinfo;

use super::{CharDevice, DeviceId};

pub struct DeviceManager {
    devices: Mutex<Vec<(DeviceId, Arc<dyn CharDevice>)>>,
}

impl DeviceManager {
    const fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
        }
    }

    /// Register `device` under `id`, running its `init` hook first.
    pub fn register(&self, id: DeviceId, device: Arc<dyn CharDevice>) -> Result<()> {
        device.init();
        let mut devices = self.devices.lock();
        if devices.iter().any(|(existing, _)| *existing == id) {
            return Err(KernelError::AlreadyExists);
        }
        kinfo!(
            "device: registered {} at ({}, {})",
            device.name(),
            id.major,
            id.minor
        );
        devices.push((id, device));
        Ok(())
    }

    /// Find the device registered under `id`.
    pub fn lookup(&self, id: DeviceId) -> Option<Arc<dyn CharDevice>> {
        self.devices
            .lock()
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, dev)| Arc::clone(dev))
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }
}

static MANAGER: Once<DeviceManager> = Once::new();

pub fn get_device_manager() -> &'static DeviceManager {
    MANAGER.call_once(DeviceManager::new)
}
