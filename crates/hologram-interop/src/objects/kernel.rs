//! Managed kernels

use crate::bundle::KernelBundle;
use crate::error::Result;
use crate::objects::context::Context;
use crate::registry::Plugin;
use hologram_native::{KernelHandle, NativeHandle};
use std::fmt;
use std::sync::Arc;

/// Managed kernel
///
/// Keeps the bundle it was imported against alive, so the program a kernel
/// was created from outlives the kernel.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    handle: KernelHandle,
    context: Context,
    plugin: Plugin,
    bundle: KernelBundle,
}

impl Kernel {
    pub(crate) fn new(handle: KernelHandle, context: Context, bundle: KernelBundle, plugin: Plugin) -> Self {
        Self {
            inner: Arc::new(KernelInner {
                handle,
                context,
                bundle,
                plugin,
            }),
        }
    }

    pub fn handle(&self) -> KernelHandle {
        self.inner.handle
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn bundle(&self) -> &KernelBundle {
        &self.inner.bundle
    }

    pub fn native_handle(&self) -> Result<NativeHandle> {
        Ok(self.inner.plugin.api().kernel_native_handle(self.inner.handle)?)
    }
}

impl Drop for KernelInner {
    fn drop(&mut self) {
        if let Err(error) = self.plugin.api().kernel_release(self.handle) {
            tracing::warn!(kernel = %self.handle, %error, "failed to release kernel");
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("handle", &self.inner.handle)
            .field("images", &self.inner.bundle.size())
            .finish()
    }
}
