//! Managed devices

use crate::backend::Backend;
use crate::error::Result;
use crate::objects::platform::Platform;
use hologram_native::{DeviceHandle, NativeHandle};
use std::fmt;
use std::sync::{Arc, Weak};

/// Managed device
///
/// Obtained through its [`Platform`]; two `Device`s compare equal only if
/// they are the same managed object.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

pub(crate) struct DeviceInner {
    handle: DeviceHandle,
    platform: Platform,
}

impl Device {
    pub(crate) fn new(handle: DeviceHandle, platform: Platform) -> Self {
        Self {
            inner: Arc::new(DeviceInner { handle, platform }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<DeviceInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<DeviceInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn handle(&self) -> DeviceHandle {
        self.inner.handle
    }

    pub fn platform(&self) -> &Platform {
        &self.inner.platform
    }

    /// Backend of the function table this device came from
    pub fn backend(&self) -> Backend {
        self.inner.platform.plugin().backend()
    }

    pub fn native_handle(&self) -> Result<NativeHandle> {
        Ok(self.inner.platform.plugin().api().device_native_handle(self.inner.handle)?)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("handle", &self.inner.handle)
            .field("platform", &self.inner.platform.handle())
            .finish()
    }
}
