//! Managed platforms
//!
//! One [`Platform`] exists per plugin platform handle while anything uses it.
//! Platforms own the find-or-create of their devices, so a native device
//! always resolves to the same managed [`Device`].

use crate::backend::Backend;
use crate::error::Result;
use crate::objects::device::{Device, DeviceInner};
use crate::registry::Plugin;
use hologram_native::{DeviceHandle, NativeHandle, PlatformHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Managed platform
#[derive(Clone)]
pub struct Platform {
    inner: Arc<PlatformInner>,
}

pub(crate) struct PlatformInner {
    handle: PlatformHandle,
    plugin: Plugin,
    devices: Mutex<HashMap<DeviceHandle, Weak<DeviceInner>>>,
}

impl Platform {
    /// Find or create the managed platform for `handle`
    pub(crate) fn get_or_make(handle: PlatformHandle, plugin: &Plugin) -> Platform {
        let mut cache = plugin.platform_cache().lock();
        if let Some(inner) = cache.get(&handle).and_then(Weak::upgrade) {
            return Platform { inner };
        }

        let inner = Arc::new(PlatformInner {
            handle,
            plugin: plugin.clone(),
            devices: Mutex::new(HashMap::new()),
        });
        cache.retain(|_, platform| platform.strong_count() > 0);
        cache.insert(handle, Arc::downgrade(&inner));
        tracing::trace!(platform = %handle, backend = %plugin.backend(), "created managed platform");
        Platform { inner }
    }

    /// Managed platform owning a plugin device
    pub(crate) fn from_device_handle(device: DeviceHandle, plugin: &Plugin) -> Result<Platform> {
        let handle = plugin.api().device_platform(device)?;
        Ok(Self::get_or_make(handle, plugin))
    }

    /// Find or create the managed device for `device`
    pub fn get_or_make_device(&self, device: DeviceHandle) -> Device {
        let mut devices = self.inner.devices.lock();
        if let Some(inner) = devices.get(&device).and_then(Weak::upgrade) {
            return Device::from_inner(inner);
        }

        let managed = Device::new(device, self.clone());
        devices.retain(|_, device| device.strong_count() > 0);
        devices.insert(device, managed.downgrade());
        tracing::trace!(platform = %self.inner.handle, %device, "created managed device");
        managed
    }

    pub fn handle(&self) -> PlatformHandle {
        self.inner.handle
    }

    pub fn plugin(&self) -> &Plugin {
        &self.inner.plugin
    }

    /// Backend the native platform reports about itself
    pub fn backend(&self) -> Result<Backend> {
        let kind = self.inner.plugin.api().platform_backend(self.inner.handle)?;
        Ok(Backend::from_native(kind))
    }

    pub fn native_handle(&self) -> Result<NativeHandle> {
        Ok(self.inner.plugin.api().platform_native_handle(self.inner.handle)?)
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Platform {}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("handle", &self.inner.handle)
            .field("backend", &self.inner.plugin.backend())
            .finish()
    }
}
