//! Native handle access from inside a running command
//!
//! An [`InteropHandle`] is only ever lent to a closure by
//! [`Queue::with_interop_handle`]; the memory association list it reads is
//! valid for that call alone.

use crate::backend::Backend;
use crate::error::{InteropError, Result};
use crate::objects::queue::Queue;
use hologram_native::{MemHandle, NativeHandle};

/// Identifies one memory requirement of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequirementId(pub u64);

/// Scoped view of the native objects behind a queue
pub struct InteropHandle<'a> {
    queue: &'a Queue,
    mem_objects: &'a [(RequirementId, MemHandle)],
}

impl<'a> InteropHandle<'a> {
    pub(crate) fn new(queue: &'a Queue, mem_objects: &'a [(RequirementId, MemHandle)]) -> Self {
        Self { queue, mem_objects }
    }

    pub fn backend(&self) -> Backend {
        self.queue.plugin().backend()
    }

    /// Native memory object for `requirement` as seen from the queue's device
    pub fn native_mem(&self, requirement: RequirementId) -> Result<NativeHandle> {
        let (_, mem) = self
            .mem_objects
            .iter()
            .find(|(id, _)| *id == requirement)
            .ok_or_else(|| InteropError::InvalidNativeObject("invalid memory object used inside interop".to_string()))?;
        let handle = self
            .queue
            .plugin()
            .api()
            .mem_native_handle(*mem, self.queue.device().handle())?;
        Ok(handle)
    }

    pub fn native_device(&self) -> Result<NativeHandle> {
        self.queue.device().native_handle()
    }

    pub fn native_context(&self) -> Result<NativeHandle> {
        self.queue.context().native_handle()
    }

    pub fn native_queue(&self, native_desc: &mut i32) -> Result<NativeHandle> {
        self.queue.native_handle(native_desc)
    }
}
