//! Managed events

use crate::error::Result;
use crate::objects::context::Context;
use crate::registry::Plugin;
use hologram_native::{EventHandle, NativeHandle};
use std::fmt;
use std::sync::Arc;

/// Managed event
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

struct EventInner {
    handle: EventHandle,
    context: Context,
    plugin: Plugin,
}

impl Event {
    pub(crate) fn new(handle: EventHandle, context: Context, plugin: Plugin) -> Self {
        Self {
            inner: Arc::new(EventInner { handle, context, plugin }),
        }
    }

    pub fn handle(&self) -> EventHandle {
        self.inner.handle
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn native_handle(&self) -> Result<NativeHandle> {
        Ok(self.inner.plugin.api().event_native_handle(self.inner.handle)?)
    }
}

impl Drop for EventInner {
    fn drop(&mut self) {
        if let Err(error) = self.plugin.api().event_release(self.handle) {
            tracing::warn!(event = %self.handle, %error, "failed to release event");
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("handle", &self.inner.handle).finish()
    }
}
