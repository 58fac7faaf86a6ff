//! Managed command queues

use crate::error::Result;
use crate::interop_handle::{InteropHandle, RequirementId};
use crate::objects::context::Context;
use crate::objects::device::Device;
use crate::registry::Plugin;
use hologram_native::{MemHandle, NativeHandle, QueueFlags, QueueHandle};
use std::fmt;
use std::sync::Arc;

/// Properties requested for an imported queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueProperties {
    /// Commands execute in submission order
    pub in_order: bool,
    pub enable_profiling: bool,
    /// Compute-engine index; not accepted when importing a native queue
    pub compute_index: Option<u32>,
}

impl QueueProperties {
    pub fn in_order() -> Self {
        Self {
            in_order: true,
            ..Self::default()
        }
    }

    pub fn with_profiling(mut self) -> Self {
        self.enable_profiling = true;
        self
    }

    pub fn with_compute_index(mut self, index: u32) -> Self {
        self.compute_index = Some(index);
        self
    }

    /// Native queue flags for these properties
    pub fn flags(&self) -> QueueFlags {
        QueueFlags {
            out_of_order: !self.in_order,
            profiling: self.enable_profiling,
        }
    }
}

/// Managed command queue
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    handle: QueueHandle,
    context: Context,
    device: Device,
    properties: QueueProperties,
    plugin: Plugin,
}

impl Queue {
    pub(crate) fn new(
        handle: QueueHandle,
        context: Context,
        device: Device,
        properties: QueueProperties,
        plugin: Plugin,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                handle,
                context,
                device,
                properties,
                plugin,
            }),
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.inner.handle
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub fn properties(&self) -> &QueueProperties {
        &self.inner.properties
    }

    pub(crate) fn plugin(&self) -> &Plugin {
        &self.inner.plugin
    }

    /// Native queue handle; `native_desc` receives the backend's descriptor
    pub fn native_handle(&self, native_desc: &mut i32) -> Result<NativeHandle> {
        Ok(self.inner.plugin.api().queue_native_handle(self.inner.handle, native_desc)?)
    }

    /// Run `f` with an interop handle over `mem_objects`
    ///
    /// The association list is borrowed for the duration of `f` only.
    pub fn with_interop_handle<R>(
        &self,
        mem_objects: &[(RequirementId, MemHandle)],
        f: impl FnOnce(&InteropHandle<'_>) -> R,
    ) -> R {
        let handle = InteropHandle::new(self, mem_objects);
        f(&handle)
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        if let Err(error) = self.plugin.api().queue_release(self.handle) {
            tracing::warn!(queue = %self.handle, %error, "failed to release queue");
        }
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("handle", &self.inner.handle)
            .field("device", &self.inner.device.handle())
            .field("properties", &self.inner.properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_out_of_order() {
        let flags = QueueProperties::default().flags();
        assert!(flags.out_of_order);
        assert!(!flags.profiling);
    }

    #[test]
    fn test_in_order_with_profiling() {
        let properties = QueueProperties::in_order().with_profiling();
        assert_eq!(
            properties.flags(),
            QueueFlags {
                out_of_order: false,
                profiling: true
            }
        );
        assert_eq!(properties.compute_index, None);
    }
}
