//! Managed contexts

use crate::backend::Backend;
use crate::error::Result;
use crate::registry::Plugin;
use hologram_native::{ContextHandle, NativeHandle};
use std::fmt;
use std::sync::Arc;

/// Managed context
///
/// Releases its plugin context once, when the last clone is dropped.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    handle: ContextHandle,
    plugin: Plugin,
}

impl Context {
    pub(crate) fn new(handle: ContextHandle, plugin: Plugin) -> Self {
        Self {
            inner: Arc::new(ContextInner { handle, plugin }),
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.inner.handle
    }

    pub fn plugin(&self) -> &Plugin {
        &self.inner.plugin
    }

    pub fn backend(&self) -> Backend {
        self.inner.plugin.backend()
    }

    pub fn native_handle(&self) -> Result<NativeHandle> {
        Ok(self.inner.plugin.api().context_native_handle(self.inner.handle)?)
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Err(error) = self.plugin.api().context_release(self.handle) {
            tracing::warn!(context = %self.handle, %error, "failed to release context");
        }
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.inner.handle)
            .field("backend", &self.inner.plugin.backend())
            .finish()
    }
}
