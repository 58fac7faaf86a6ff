//! Opaque handles for native and plugin-level objects
//!
//! Two handle spaces exist side by side:
//!
//! - [`NativeHandle`] identifies an object inside the native backend's own
//!   runtime (an OpenCL `cl_program`, a Level Zero module, a CUDA context...).
//!   It is never interpreted on this side of the boundary.
//! - Plugin handles ([`ProgramHandle`], [`DeviceHandle`], ...) identify the
//!   function table's wrapper objects around native ones. They are what every
//!   [`NativeApi`](crate::NativeApi) call takes and returns.

use std::fmt;

/// Handle to an object owned by the native backend
///
/// Backend-defined integer/pointer value. Only threaded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    /// The null native handle
    pub const NULL: NativeHandle = NativeHandle(0);

    /// Create a native handle from its raw value
    pub const fn new(raw: u64) -> Self {
        NativeHandle(raw)
    }

    /// Get the raw value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the null handle
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native:{:#x}", self.0)
    }
}

macro_rules! plugin_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a handle from a plugin object id
            pub const fn new(id: u64) -> Self {
                $name(id)
            }

            /// Get the plugin object id
            pub const fn id(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

plugin_handle!(
    /// Plugin handle to a platform
    PlatformHandle,
    "platform"
);
plugin_handle!(
    /// Plugin handle to a device
    DeviceHandle,
    "device"
);
plugin_handle!(
    /// Plugin handle to a context
    ContextHandle,
    "context"
);
plugin_handle!(
    /// Plugin handle to a command queue
    QueueHandle,
    "queue"
);
plugin_handle!(
    /// Plugin handle to an event
    EventHandle,
    "event"
);
plugin_handle!(
    /// Plugin handle to a program
    ///
    /// May change identity across a link: linking produces a new program.
    ProgramHandle,
    "program"
);
plugin_handle!(
    /// Plugin handle to a kernel
    KernelHandle,
    "kernel"
);
plugin_handle!(
    /// Plugin handle to a memory object
    MemHandle,
    "mem"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(NativeHandle::new(0xbeef).to_string(), "native:0xbeef");
        assert_eq!(ProgramHandle::new(7).to_string(), "program7");
        assert_eq!(DeviceHandle::new(2).to_string(), "device2");
    }

    #[test]
    fn test_null() {
        assert!(NativeHandle::NULL.is_null());
        assert!(!NativeHandle::new(1).is_null());
        assert_eq!(KernelHandle::new(9).id(), 9);
    }
}
