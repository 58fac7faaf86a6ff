//! Object store for the reference backend
//!
//! Holds two tables:
//!
//! ```text
//! natives  - objects living "inside" the backend, reference counted,
//!            addressed by NativeHandle
//! plugins  - function-table wrappers around natives, with their own
//!            reference count and an owns-native flag
//! ```
//!
//! When a plugin object's count drops to zero it is destroyed, and if it
//! owns its native object that object loses one reference.

use crate::error::{NativeError, NativeResult};
use crate::handle::NativeHandle;
use crate::types::{NativePlatformBackend, ProgramBinaryType, QueueFlags};
use std::collections::HashMap;

/// First id handed out for native objects, so native and plugin ids never look alike
const NATIVE_ID_BASE: u64 = 0x1000;

#[derive(Debug, Clone)]
pub(crate) enum NativeKind {
    Platform {
        backend: NativePlatformBackend,
    },
    Device {
        platform: u64,
    },
    Context {
        devices: Vec<u64>,
    },
    Queue {
        device: u64,
    },
    Event,
    Program {
        devices: Vec<u64>,
        stages: HashMap<u64, ProgramBinaryType>,
        kernels: Vec<String>,
    },
    Kernel {
        program: u64,
    },
    Mem,
}

impl NativeKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Platform { .. } => "platform",
            Self::Device { .. } => "device",
            Self::Context { .. } => "context",
            Self::Queue { .. } => "queue",
            Self::Event => "event",
            Self::Program { .. } => "program",
            Self::Kernel { .. } => "kernel",
            Self::Mem => "mem",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NativeObject {
    pub(crate) kind: NativeKind,
    pub(crate) refs: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum PluginKind {
    Platform,
    Device,
    Context,
    Queue {
        device: u64,
        flags: QueueFlags,
        native_desc: i32,
    },
    Event,
    Program,
    Kernel,
    Mem,
}

impl PluginKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Device => "device",
            Self::Context => "context",
            Self::Queue { .. } => "queue",
            Self::Event => "event",
            Self::Program => "program",
            Self::Kernel => "kernel",
            Self::Mem => "mem",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PluginObject {
    pub(crate) kind: PluginKind,
    pub(crate) native: u64,
    pub(crate) refs: u32,
    pub(crate) owns_native: bool,
}

/// Native and plugin object tables
#[derive(Debug)]
pub(crate) struct ObjectStore {
    natives: HashMap<u64, NativeObject>,
    plugins: HashMap<u64, PluginObject>,
    /// Platforms and devices are wrapped once per native object and live
    /// as long as the backend.
    platform_wrappers: HashMap<u64, u64>,
    device_wrappers: HashMap<u64, u64>,
    next_native_id: u64,
    next_plugin_id: u64,
}

impl ObjectStore {
    pub(crate) fn new() -> Self {
        Self {
            natives: HashMap::new(),
            plugins: HashMap::new(),
            platform_wrappers: HashMap::new(),
            device_wrappers: HashMap::new(),
            next_native_id: NATIVE_ID_BASE,
            next_plugin_id: 1,
        }
    }

    // ============================================================================================
    // Native objects
    // ============================================================================================

    /// Create a native object holding one reference (the creator's)
    pub(crate) fn create_native(&mut self, kind: NativeKind) -> NativeHandle {
        let id = self.next_native_id;
        self.next_native_id += 1;
        self.natives.insert(id, NativeObject { kind, refs: 1 });
        NativeHandle::new(id)
    }

    pub(crate) fn native(&self, handle: NativeHandle, kind: &'static str) -> NativeResult<&NativeObject> {
        match self.natives.get(&handle.raw()) {
            Some(object) if object.kind.name() == kind => Ok(object),
            _ => Err(NativeError::InvalidNativeHandle { kind, handle }),
        }
    }

    pub(crate) fn native_mut(&mut self, handle: NativeHandle, kind: &'static str) -> NativeResult<&mut NativeObject> {
        match self.natives.get_mut(&handle.raw()) {
            Some(object) if object.kind.name() == kind => Ok(object),
            _ => Err(NativeError::InvalidNativeHandle { kind, handle }),
        }
    }

    pub(crate) fn native_refs(&self, handle: NativeHandle) -> Option<u32> {
        self.natives.get(&handle.raw()).map(|object| object.refs)
    }

    pub(crate) fn retain_native(&mut self, handle: NativeHandle) -> NativeResult<()> {
        let object = self
            .natives
            .get_mut(&handle.raw())
            .ok_or(NativeError::InvalidNativeHandle { kind: "object", handle })?;
        object.refs += 1;
        Ok(())
    }

    /// Drop one native reference, destroying the object at zero
    pub(crate) fn release_native(&mut self, handle: NativeHandle) -> NativeResult<()> {
        let object = self
            .natives
            .get_mut(&handle.raw())
            .ok_or(NativeError::InvalidNativeHandle { kind: "object", handle })?;
        object.refs -= 1;
        if object.refs == 0 {
            let kind = object.kind.name();
            self.natives.remove(&handle.raw());
            tracing::trace!(%handle, kind, "native object destroyed");
        }
        Ok(())
    }

    // ============================================================================================
    // Plugin objects
    // ============================================================================================

    /// Wrap a native object in a new plugin object
    pub(crate) fn wrap(&mut self, kind: PluginKind, native: NativeHandle, owns_native: bool, refs: u32) -> u64 {
        let id = self.next_plugin_id;
        self.next_plugin_id += 1;
        self.plugins.insert(
            id,
            PluginObject {
                kind,
                native: native.raw(),
                refs,
                owns_native,
            },
        );
        id
    }

    /// Wrap a native platform, reusing an existing wrapper
    pub(crate) fn wrap_platform(&mut self, native: NativeHandle) -> NativeResult<u64> {
        self.native(native, "platform")?;
        if let Some(&id) = self.platform_wrappers.get(&native.raw()) {
            return Ok(id);
        }
        let id = self.wrap(PluginKind::Platform, native, false, 1);
        self.platform_wrappers.insert(native.raw(), id);
        Ok(id)
    }

    /// Wrap a native device, reusing an existing wrapper
    pub(crate) fn wrap_device(&mut self, native: NativeHandle) -> NativeResult<u64> {
        self.native(native, "device")?;
        if let Some(&id) = self.device_wrappers.get(&native.raw()) {
            return Ok(id);
        }
        let id = self.wrap(PluginKind::Device, native, false, 1);
        self.device_wrappers.insert(native.raw(), id);
        Ok(id)
    }

    pub(crate) fn plugin(&self, id: u64, kind: &'static str) -> NativeResult<&PluginObject> {
        match self.plugins.get(&id) {
            Some(object) if object.kind.name() == kind => Ok(object),
            _ => Err(NativeError::InvalidHandle { kind, id }),
        }
    }

    /// Native object behind a plugin handle
    pub(crate) fn plugin_native(&self, id: u64, kind: &'static str) -> NativeResult<NativeHandle> {
        self.plugin(id, kind).map(|object| NativeHandle::new(object.native))
    }

    pub(crate) fn plugin_refs(&self, id: u64) -> Option<u32> {
        self.plugins.get(&id).map(|object| object.refs)
    }

    pub(crate) fn live_plugins(&self) -> usize {
        self.plugins.len()
    }

    pub(crate) fn retain_plugin(&mut self, id: u64, kind: &'static str) -> NativeResult<()> {
        self.plugin(id, kind)?;
        if let Some(object) = self.plugins.get_mut(&id) {
            object.refs += 1;
        }
        Ok(())
    }

    /// Drop one plugin reference; at zero the wrapper is destroyed and, if it
    /// owns its native object, the native object loses one reference
    pub(crate) fn release_plugin(&mut self, id: u64, kind: &'static str) -> NativeResult<()> {
        let object = self.plugin(id, kind)?;
        if object.refs == 0 {
            return Err(NativeError::RefCountUnderflow { kind, id });
        }
        let remaining = object.refs - 1;
        let native = NativeHandle::new(object.native);
        let owns_native = object.owns_native;

        if remaining > 0 {
            if let Some(object) = self.plugins.get_mut(&id) {
                object.refs = remaining;
            }
            return Ok(());
        }

        self.plugins.remove(&id);
        tracing::trace!(id, kind, owns_native, "plugin object destroyed");
        if owns_native {
            self.release_native(native)?;
        }
        Ok(())
    }

    /// Plugin device id for every native device of a native program
    pub(crate) fn program_device_ids(&mut self, native: NativeHandle) -> NativeResult<Vec<u64>> {
        let devices = match &self.native(native, "program")?.kind {
            NativeKind::Program { devices, .. } => devices.clone(),
            _ => return Err(NativeError::InvalidNativeHandle { kind: "program", handle: native }),
        };
        devices
            .into_iter()
            .map(|device| self.wrap_device(NativeHandle::new(device)))
            .collect()
    }
}
