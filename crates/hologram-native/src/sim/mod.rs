//! Reference backend
//!
//! An in-process native layer implementing [`NativeApi`]. It keeps real
//! reference counts for native and plugin objects, per-device program
//! stages, and a log of every native call, so the runtime's import logic can
//! be exercised and observed without vendor drivers.
//!
//! # Architecture
//!
//! ```text
//! SimBackend
//! ├── SimConfig    - which native quirks to model
//! └── SimState
//!     ├── ObjectStore  - native objects + plugin wrappers
//!     ├── calls        - every NativeApi call, in order
//!     └── failures     - one-shot injected errors per operation
//! ```
//!
//! # Quirks
//!
//! - `extended_entry_points = false`: every `*_exp` call reports
//!   [`NativeError::UnsupportedFeature`].
//! - `retain_on_import = false`: `*_create_with_native_handle` does not take
//!   a plugin-level reference; the new wrapper starts at zero and a release
//!   without a prior retain underflows.
//! - `kernel_requires_program = true`: kernel import without the owning
//!   program is rejected.
//!
//! # Usage
//!
//! ```rust
//! use hologram_native::sim::{SimBackend, SimConfig};
//! use hologram_native::{NativeApi, NativeProperties, ProgramBinaryType};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sim = SimBackend::new(SimConfig::cuda());
//! let platform = sim.create_platform();
//! let device = sim.create_device(platform)?;
//! let context = sim.create_context(&[device])?;
//! let program = sim.create_program(&[device], ProgramBinaryType::None, &["saxpy"])?;
//!
//! let ctx = sim.context_create_with_native_handle(context, &[], &NativeProperties::borrowed())?;
//! let prog = sim.program_create_with_native_handle(program, ctx, &NativeProperties::borrowed())?;
//! let devices = sim.program_devices(prog)?;
//! sim.program_build_exp(prog, &devices, None)?;
//! assert_eq!(sim.program_binary_type(prog, devices[0])?, ProgramBinaryType::Executable);
//! # Ok(())
//! # }
//! ```

mod objects;

use crate::api::NativeApi;
use crate::error::{NativeError, NativeResult};
use crate::handle::{
    ContextHandle, DeviceHandle, EventHandle, KernelHandle, MemHandle, NativeHandle, PlatformHandle, ProgramHandle,
    QueueHandle,
};
use crate::types::{NativeProperties, NativePlatformBackend, ProgramBinaryType, QueueFlags, QueueNativeProperties};
use objects::{NativeKind, ObjectStore, PluginKind};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Native quirks modelled by a [`SimBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Name reported through [`NativeApi::name`]
    pub name: String,
    /// Backend kind native platforms report about themselves
    pub platform_backend: NativePlatformBackend,
    /// Whether the per-device `*_exp` entry points exist
    pub extended_entry_points: bool,
    /// Whether creating a wrapper from a native handle takes a reference
    pub retain_on_import: bool,
    /// Whether kernel import needs the owning program
    pub kernel_requires_program: bool,
}

impl SimConfig {
    /// OpenCL-like: legacy entry points only, no reference on import
    pub fn opencl() -> Self {
        Self {
            name: "opencl".to_string(),
            platform_backend: NativePlatformBackend::OpenCl,
            extended_entry_points: false,
            retain_on_import: false,
            kernel_requires_program: false,
        }
    }

    /// Level Zero-like: extended entry points, kernels need their module
    pub fn level_zero() -> Self {
        Self {
            name: "level_zero".to_string(),
            platform_backend: NativePlatformBackend::LevelZero,
            extended_entry_points: true,
            retain_on_import: true,
            kernel_requires_program: true,
        }
    }

    /// CUDA-like
    pub fn cuda() -> Self {
        Self {
            name: "cuda".to_string(),
            platform_backend: NativePlatformBackend::Cuda,
            extended_entry_points: true,
            retain_on_import: true,
            kernel_requires_program: false,
        }
    }

    /// HIP-like
    pub fn hip() -> Self {
        Self {
            name: "hip".to_string(),
            platform_backend: NativePlatformBackend::Hip,
            ..Self::cuda()
        }
    }

    /// This configuration without the extended entry points
    pub fn legacy_only(self) -> Self {
        Self {
            extended_entry_points: false,
            ..self
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::cuda()
    }
}

/// One [`NativeApi`] operation, as recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    PlatformCreate,
    PlatformBackend,
    PlatformNativeHandle,
    DeviceCreate,
    DevicePlatform,
    DeviceNativeHandle,
    ContextCreate,
    ContextNativeHandle,
    ContextRetain,
    ContextRelease,
    QueueCreate,
    QueueDevice,
    QueueNativeHandle,
    QueueRetain,
    QueueRelease,
    EventCreate,
    EventNativeHandle,
    EventRetain,
    EventRelease,
    ProgramCreate,
    ProgramRetain,
    ProgramRelease,
    ProgramNumDevices,
    ProgramDevices,
    ProgramBinaryType,
    ProgramKernelNames,
    ProgramCompileExp,
    ProgramCompile,
    ProgramBuildExp,
    ProgramBuild,
    ProgramLinkExp,
    ProgramLink,
    KernelCreate,
    KernelNativeHandle,
    KernelRetain,
    KernelRelease,
    MemNativeHandle,
}

impl SimOp {
    /// Whether this operation changes a program's compilation stage
    pub fn mutates_program(self) -> bool {
        matches!(
            self,
            Self::ProgramCompileExp
                | Self::ProgramCompile
                | Self::ProgramBuildExp
                | Self::ProgramBuild
                | Self::ProgramLinkExp
                | Self::ProgramLink
        )
    }
}

struct SimState {
    store: ObjectStore,
    calls: Vec<SimOp>,
    failures: HashMap<SimOp, NativeError>,
    last_options: Option<String>,
}

/// In-process reference implementation of [`NativeApi`]
///
/// Cloning shares the underlying state, so a test can hand one clone to the
/// runtime and keep another to inspect reference counts and the call log.
#[derive(Clone)]
pub struct SimBackend {
    config: SimConfig,
    state: Arc<Mutex<SimState>>,
}

impl SimBackend {
    /// Create a new reference backend
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(SimState {
                store: ObjectStore::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                last_options: None,
            })),
        }
    }

    /// Modelled quirks
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Record a call and apply any injected failure for it
    fn begin(&self, op: SimOp) -> NativeResult<MutexGuard<'_, SimState>> {
        let mut state = self.state.lock();
        state.calls.push(op);
        tracing::trace!(backend = %self.config.name, ?op, "native call");
        if let Some(error) = state.failures.remove(&op) {
            tracing::debug!(backend = %self.config.name, ?op, %error, "injected failure");
            return Err(error);
        }
        Ok(state)
    }

    fn begin_extended(&self, op: SimOp, name: &'static str) -> NativeResult<MutexGuard<'_, SimState>> {
        let state = self.begin(op)?;
        if !self.config.extended_entry_points {
            return Err(NativeError::UnsupportedFeature(name));
        }
        Ok(state)
    }

    fn initial_refs(&self) -> u32 {
        if self.config.retain_on_import {
            1
        } else {
            0
        }
    }

    // ============================================================================================
    // Native object creation (the caller's side of the boundary)
    // ============================================================================================

    /// Create a native platform reporting this backend's kind
    pub fn create_platform(&self) -> NativeHandle {
        self.state.lock().store.create_native(NativeKind::Platform {
            backend: self.config.platform_backend,
        })
    }

    /// Create a native device on `platform`
    pub fn create_device(&self, platform: NativeHandle) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        state.store.native(platform, "platform")?;
        Ok(state.store.create_native(NativeKind::Device {
            platform: platform.raw(),
        }))
    }

    /// Create a native context over `devices`
    pub fn create_context(&self, devices: &[NativeHandle]) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        for &device in devices {
            state.store.native(device, "device")?;
        }
        Ok(state.store.create_native(NativeKind::Context {
            devices: devices.iter().map(|d| d.raw()).collect(),
        }))
    }

    /// Create a native queue submitting to `device`
    pub fn create_queue(&self, device: NativeHandle) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        state.store.native(device, "device")?;
        Ok(state.store.create_native(NativeKind::Queue { device: device.raw() }))
    }

    /// Create a native event
    pub fn create_event(&self) -> NativeHandle {
        self.state.lock().store.create_native(NativeKind::Event)
    }

    /// Create a native program for `devices`, all at `stage`
    pub fn create_program(
        &self,
        devices: &[NativeHandle],
        stage: ProgramBinaryType,
        kernels: &[&str],
    ) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        for &device in devices {
            state.store.native(device, "device")?;
        }
        let ids: Vec<u64> = devices.iter().map(|d| d.raw()).collect();
        let stages = ids.iter().map(|&id| (id, stage)).collect();
        Ok(state.store.create_native(NativeKind::Program {
            devices: ids,
            stages,
            kernels: kernels.iter().map(|k| k.to_string()).collect(),
        }))
    }

    /// Override the stage of a native program for one device
    pub fn set_program_stage(
        &self,
        program: NativeHandle,
        device: NativeHandle,
        stage: ProgramBinaryType,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        match &mut state.store.native_mut(program, "program")?.kind {
            NativeKind::Program { stages, .. } => match stages.get_mut(&device.raw()) {
                Some(current) => {
                    *current = stage;
                    Ok(())
                }
                None => Err(NativeError::InvalidNativeHandle { kind: "device", handle: device }),
            },
            _ => Err(NativeError::InvalidNativeHandle { kind: "program", handle: program }),
        }
    }

    /// Stage of a native program for one native device
    pub fn program_stage(&self, program: NativeHandle, device: NativeHandle) -> Option<ProgramBinaryType> {
        let state = self.state.lock();
        match &state.store.native(program, "program").ok()?.kind {
            NativeKind::Program { stages, .. } => stages.get(&device.raw()).copied(),
            _ => None,
        }
    }

    /// Create a native kernel `name` inside `program`
    ///
    /// Fails when `program` does not define `name`.
    pub fn create_kernel(&self, program: NativeHandle, name: &str) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        match &state.store.native(program, "program")?.kind {
            NativeKind::Program { kernels, .. } if kernels.iter().any(|kernel| kernel == name) => {}
            _ => return Err(NativeError::invalid_value(format!("{program} defines no kernel {name}"))),
        }
        Ok(state.store.create_native(NativeKind::Kernel { program: program.raw() }))
    }

    /// Create a memory object already wrapped for the runtime
    pub fn create_mem(&self) -> MemHandle {
        let mut state = self.state.lock();
        let native = state.store.create_native(NativeKind::Mem);
        MemHandle::new(state.store.wrap(PluginKind::Mem, native, true, 1))
    }

    /// Take a reference on the caller's behalf
    pub fn retain_native(&self, handle: NativeHandle) -> NativeResult<()> {
        self.state.lock().store.retain_native(handle)
    }

    /// Drop a reference on the caller's behalf
    pub fn release_native(&self, handle: NativeHandle) -> NativeResult<()> {
        self.state.lock().store.release_native(handle)
    }

    // ============================================================================================
    // Inspection
    // ============================================================================================

    /// Native reference count, `None` once the object is destroyed
    pub fn native_ref_count(&self, handle: NativeHandle) -> Option<u32> {
        self.state.lock().store.native_refs(handle)
    }

    /// Whether the native object still exists
    pub fn is_alive(&self, handle: NativeHandle) -> bool {
        self.native_ref_count(handle).is_some()
    }

    /// Plugin-level reference count, `None` once the wrapper is destroyed
    pub fn plugin_ref_count(&self, id: u64) -> Option<u32> {
        self.state.lock().store.plugin_refs(id)
    }

    /// Native program behind a plugin program
    pub fn program_native(&self, program: ProgramHandle) -> Option<NativeHandle> {
        self.state.lock().store.plugin_native(program.id(), "program").ok()
    }

    /// Number of live plugin wrappers, platforms and devices included
    pub fn live_plugin_objects(&self) -> usize {
        self.state.lock().store.live_plugins()
    }

    /// Flags a queue wrapper was created with
    pub fn queue_flags(&self, queue: QueueHandle) -> Option<QueueFlags> {
        match self.state.lock().store.plugin(queue.id(), "queue").ok()?.kind {
            PluginKind::Queue { flags, .. } => Some(flags),
            _ => None,
        }
    }

    /// Every native call so far, in order
    pub fn calls(&self) -> Vec<SimOp> {
        self.state.lock().calls.clone()
    }

    /// How many times `op` was called
    pub fn call_count(&self, op: SimOp) -> usize {
        self.state.lock().calls.iter().filter(|&&c| c == op).count()
    }

    /// Forget the call log
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make the next call of `op` fail with `error`
    pub fn inject_failure(&self, op: SimOp, error: NativeError) {
        self.state.lock().failures.insert(op, error);
    }

    /// Options passed to the most recent compile, build or link
    pub fn last_options(&self) -> Option<String> {
        self.state.lock().last_options.clone()
    }

    // ============================================================================================
    // Program stage transitions
    // ============================================================================================

    /// Move the selected devices (all when `devices` is `None`) from `from`
    /// stages to `to`. Strict mode rejects selected devices in other stages;
    /// lenient mode skips them.
    fn transition(
        state: &mut SimState,
        program: ProgramHandle,
        devices: Option<&[DeviceHandle]>,
        from: &[ProgramBinaryType],
        to: ProgramBinaryType,
        options: Option<&str>,
    ) -> NativeResult<()> {
        let native = state.store.plugin_native(program.id(), "program")?;
        let selected = match devices {
            Some(devices) => Some(
                devices
                    .iter()
                    .map(|d| state.store.plugin_native(d.id(), "device").map(|n| n.raw()))
                    .collect::<NativeResult<Vec<_>>>()?,
            ),
            None => None,
        };
        state.last_options = options.map(str::to_string);

        let NativeKind::Program { devices: all, stages, .. } = &mut state.store.native_mut(native, "program")?.kind
        else {
            return Err(NativeError::InvalidNativeHandle { kind: "program", handle: native });
        };

        match selected {
            Some(selected) => {
                for device in &selected {
                    if !all.contains(device) {
                        return Err(NativeError::invalid_value(format!("device {device:#x} not in program")));
                    }
                    let stage = stages.get(device).copied().unwrap_or(ProgramBinaryType::None);
                    if !from.contains(&stage) {
                        return Err(NativeError::invalid_value(format!(
                            "program is {stage} for device {device:#x}, expected one of {from:?}"
                        )));
                    }
                }
                for device in selected {
                    stages.insert(device, to);
                }
            }
            None => {
                for stage in stages.values_mut() {
                    if from.contains(stage) {
                        *stage = to;
                    }
                }
            }
        }
        Ok(())
    }

    /// Link `programs` into a new program owned by a new wrapper
    fn link(
        &self,
        state: &mut SimState,
        programs: &[ProgramHandle],
        devices: Option<&[DeviceHandle]>,
        options: Option<&str>,
    ) -> NativeResult<ProgramHandle> {
        if programs.is_empty() {
            return Err(NativeError::invalid_value("no input programs"));
        }
        let selected = match devices {
            Some(devices) => Some(
                devices
                    .iter()
                    .map(|d| state.store.plugin_native(d.id(), "device").map(|n| n.raw()))
                    .collect::<NativeResult<Vec<_>>>()?,
            ),
            None => None,
        };
        state.last_options = options.map(str::to_string);

        let mut linked_devices: Vec<u64> = Vec::new();
        let mut linked_stages: HashMap<u64, ProgramBinaryType> = HashMap::new();
        let mut linked_kernels: Vec<String> = Vec::new();

        for program in programs {
            let native = state.store.plugin_native(program.id(), "program")?;
            let NativeKind::Program { devices, stages, kernels } = &state.store.native(native, "program")?.kind else {
                return Err(NativeError::InvalidNativeHandle { kind: "program", handle: native });
            };
            for device in devices {
                if !linked_devices.contains(device) {
                    linked_devices.push(*device);
                }
                let stage = stages.get(device).copied().unwrap_or(ProgramBinaryType::None);
                let wanted = selected.as_ref().is_none_or(|s| s.contains(device));
                let linked = if wanted {
                    match stage {
                        ProgramBinaryType::CompiledObject | ProgramBinaryType::Library => ProgramBinaryType::Executable,
                        other => {
                            return Err(NativeError::link_failure(format!(
                                "cannot link {other} binary for device {device:#x}"
                            )))
                        }
                    }
                } else {
                    stage
                };
                linked_stages.insert(*device, linked);
            }
            for kernel in kernels {
                if !linked_kernels.contains(kernel) {
                    linked_kernels.push(kernel.clone());
                }
            }
        }

        let native = state.store.create_native(NativeKind::Program {
            devices: linked_devices,
            stages: linked_stages,
            kernels: linked_kernels,
        });
        let id = state.store.wrap(PluginKind::Program, native, true, 1);
        tracing::trace!(backend = %self.config.name, program = id, %native, "linked program");
        Ok(ProgramHandle::new(id))
    }
}

impl NativeApi for SimBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn platform_create_with_native_handle(&self, native: NativeHandle) -> NativeResult<PlatformHandle> {
        let mut state = self.begin(SimOp::PlatformCreate)?;
        state.store.wrap_platform(native).map(PlatformHandle::new)
    }

    fn platform_backend(&self, platform: PlatformHandle) -> NativeResult<NativePlatformBackend> {
        let state = self.begin(SimOp::PlatformBackend)?;
        let native = state.store.plugin_native(platform.id(), "platform")?;
        match state.store.native(native, "platform")?.kind {
            NativeKind::Platform { backend } => Ok(backend),
            _ => Err(NativeError::InvalidNativeHandle { kind: "platform", handle: native }),
        }
    }

    fn platform_native_handle(&self, platform: PlatformHandle) -> NativeResult<NativeHandle> {
        let state = self.begin(SimOp::PlatformNativeHandle)?;
        state.store.plugin_native(platform.id(), "platform")
    }

    fn device_create_with_native_handle(
        &self,
        native: NativeHandle,
        platform: Option<PlatformHandle>,
    ) -> NativeResult<DeviceHandle> {
        let mut state = self.begin(SimOp::DeviceCreate)?;
        if let Some(platform) = platform {
            state.store.plugin(platform.id(), "platform")?;
        }
        state.store.wrap_device(native).map(DeviceHandle::new)
    }

    fn device_platform(&self, device: DeviceHandle) -> NativeResult<PlatformHandle> {
        let mut state = self.begin(SimOp::DevicePlatform)?;
        let native = state.store.plugin_native(device.id(), "device")?;
        let platform = match state.store.native(native, "device")?.kind {
            NativeKind::Device { platform } => NativeHandle::new(platform),
            _ => return Err(NativeError::InvalidNativeHandle { kind: "device", handle: native }),
        };
        state.store.wrap_platform(platform).map(PlatformHandle::new)
    }

    fn device_native_handle(&self, device: DeviceHandle) -> NativeResult<NativeHandle> {
        let state = self.begin(SimOp::DeviceNativeHandle)?;
        state.store.plugin_native(device.id(), "device")
    }

    fn context_create_with_native_handle(
        &self,
        native: NativeHandle,
        devices: &[DeviceHandle],
        properties: &NativeProperties,
    ) -> NativeResult<ContextHandle> {
        let mut state = self.begin(SimOp::ContextCreate)?;
        state.store.native(native, "context")?;
        for device in devices {
            state.store.plugin(device.id(), "device")?;
        }
        let refs = self.initial_refs();
        let id = state
            .store
            .wrap(PluginKind::Context, native, properties.is_native_handle_owned, refs);
        Ok(ContextHandle::new(id))
    }

    fn context_native_handle(&self, context: ContextHandle) -> NativeResult<NativeHandle> {
        let state = self.begin(SimOp::ContextNativeHandle)?;
        state.store.plugin_native(context.id(), "context")
    }

    fn context_retain(&self, context: ContextHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::ContextRetain)?;
        state.store.retain_plugin(context.id(), "context")
    }

    fn context_release(&self, context: ContextHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::ContextRelease)?;
        state.store.release_plugin(context.id(), "context")
    }

    fn queue_create_with_native_handle(
        &self,
        native: NativeHandle,
        context: ContextHandle,
        device: Option<DeviceHandle>,
        properties: &QueueNativeProperties,
    ) -> NativeResult<QueueHandle> {
        let mut state = self.begin(SimOp::QueueCreate)?;
        state.store.plugin(context.id(), "context")?;
        let native_device = match state.store.native(native, "queue")?.kind {
            NativeKind::Queue { device } => NativeHandle::new(device),
            _ => return Err(NativeError::InvalidNativeHandle { kind: "queue", handle: native }),
        };
        let device = match device {
            Some(device) => {
                state.store.plugin(device.id(), "device")?;
                device.id()
            }
            None => state.store.wrap_device(native_device)?,
        };
        let kind = PluginKind::Queue {
            device,
            flags: properties.flags,
            native_desc: properties.native_desc,
        };
        let refs = self.initial_refs();
        let id = state
            .store
            .wrap(kind, native, properties.native.is_native_handle_owned, refs);
        Ok(QueueHandle::new(id))
    }

    fn queue_device(&self, queue: QueueHandle) -> NativeResult<DeviceHandle> {
        let state = self.begin(SimOp::QueueDevice)?;
        match state.store.plugin(queue.id(), "queue")?.kind {
            PluginKind::Queue { device, .. } => Ok(DeviceHandle::new(device)),
            _ => Err(NativeError::InvalidHandle { kind: "queue", id: queue.id() }),
        }
    }

    fn queue_native_handle(&self, queue: QueueHandle, native_desc: &mut i32) -> NativeResult<NativeHandle> {
        let state = self.begin(SimOp::QueueNativeHandle)?;
        let object = state.store.plugin(queue.id(), "queue")?;
        if let PluginKind::Queue { native_desc: desc, .. } = object.kind {
            *native_desc = desc;
        }
        Ok(NativeHandle::new(object.native))
    }

    fn queue_retain(&self, queue: QueueHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::QueueRetain)?;
        state.store.retain_plugin(queue.id(), "queue")
    }

    fn queue_release(&self, queue: QueueHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::QueueRelease)?;
        state.store.release_plugin(queue.id(), "queue")
    }

    fn event_create_with_native_handle(
        &self,
        native: NativeHandle,
        context: ContextHandle,
        properties: &NativeProperties,
    ) -> NativeResult<EventHandle> {
        let mut state = self.begin(SimOp::EventCreate)?;
        state.store.plugin(context.id(), "context")?;
        state.store.native(native, "event")?;
        let refs = self.initial_refs();
        let id = state
            .store
            .wrap(PluginKind::Event, native, properties.is_native_handle_owned, refs);
        Ok(EventHandle::new(id))
    }

    fn event_native_handle(&self, event: EventHandle) -> NativeResult<NativeHandle> {
        let state = self.begin(SimOp::EventNativeHandle)?;
        state.store.plugin_native(event.id(), "event")
    }

    fn event_retain(&self, event: EventHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::EventRetain)?;
        state.store.retain_plugin(event.id(), "event")
    }

    fn event_release(&self, event: EventHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::EventRelease)?;
        state.store.release_plugin(event.id(), "event")
    }

    fn program_create_with_native_handle(
        &self,
        native: NativeHandle,
        context: ContextHandle,
        properties: &NativeProperties,
    ) -> NativeResult<ProgramHandle> {
        let mut state = self.begin(SimOp::ProgramCreate)?;
        state.store.plugin(context.id(), "context")?;
        state.store.native(native, "program")?;
        let refs = self.initial_refs();
        let id = state
            .store
            .wrap(PluginKind::Program, native, properties.is_native_handle_owned, refs);
        Ok(ProgramHandle::new(id))
    }

    fn program_retain(&self, program: ProgramHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::ProgramRetain)?;
        state.store.retain_plugin(program.id(), "program")
    }

    fn program_release(&self, program: ProgramHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::ProgramRelease)?;
        state.store.release_plugin(program.id(), "program")
    }

    fn program_num_devices(&self, program: ProgramHandle) -> NativeResult<u32> {
        let state = self.begin(SimOp::ProgramNumDevices)?;
        let native = state.store.plugin_native(program.id(), "program")?;
        match &state.store.native(native, "program")?.kind {
            NativeKind::Program { devices, .. } => {
                u32::try_from(devices.len()).map_err(|_| NativeError::invalid_value("too many devices"))
            }
            _ => Err(NativeError::InvalidNativeHandle { kind: "program", handle: native }),
        }
    }

    fn program_devices(&self, program: ProgramHandle) -> NativeResult<Vec<DeviceHandle>> {
        let mut state = self.begin(SimOp::ProgramDevices)?;
        let native = state.store.plugin_native(program.id(), "program")?;
        let ids = state.store.program_device_ids(native)?;
        Ok(ids.into_iter().map(DeviceHandle::new).collect())
    }

    fn program_binary_type(&self, program: ProgramHandle, device: DeviceHandle) -> NativeResult<ProgramBinaryType> {
        let state = self.begin(SimOp::ProgramBinaryType)?;
        let native = state.store.plugin_native(program.id(), "program")?;
        let native_device = state.store.plugin_native(device.id(), "device")?;
        match &state.store.native(native, "program")?.kind {
            NativeKind::Program { stages, .. } => stages
                .get(&native_device.raw())
                .copied()
                .ok_or_else(|| NativeError::invalid_value(format!("{device} not associated with {program}"))),
            _ => Err(NativeError::InvalidNativeHandle { kind: "program", handle: native }),
        }
    }

    fn program_kernel_names(&self, program: ProgramHandle) -> NativeResult<Vec<String>> {
        let state = self.begin(SimOp::ProgramKernelNames)?;
        let native = state.store.plugin_native(program.id(), "program")?;
        match &state.store.native(native, "program")?.kind {
            NativeKind::Program { kernels, .. } => Ok(kernels.clone()),
            _ => Err(NativeError::InvalidNativeHandle { kind: "program", handle: native }),
        }
    }

    fn program_compile_exp(
        &self,
        program: ProgramHandle,
        devices: &[DeviceHandle],
        options: Option<&str>,
    ) -> NativeResult<()> {
        let mut state = self.begin_extended(SimOp::ProgramCompileExp, "program_compile_exp")?;
        Self::transition(
            &mut state,
            program,
            Some(devices),
            &[ProgramBinaryType::None],
            ProgramBinaryType::CompiledObject,
            options,
        )
    }

    fn program_compile(
        &self,
        context: ContextHandle,
        program: ProgramHandle,
        options: Option<&str>,
    ) -> NativeResult<()> {
        let mut state = self.begin(SimOp::ProgramCompile)?;
        state.store.plugin(context.id(), "context")?;
        Self::transition(
            &mut state,
            program,
            None,
            &[ProgramBinaryType::None],
            ProgramBinaryType::CompiledObject,
            options,
        )
    }

    fn program_build_exp(
        &self,
        program: ProgramHandle,
        devices: &[DeviceHandle],
        options: Option<&str>,
    ) -> NativeResult<()> {
        let mut state = self.begin_extended(SimOp::ProgramBuildExp, "program_build_exp")?;
        Self::transition(
            &mut state,
            program,
            Some(devices),
            &[ProgramBinaryType::None],
            ProgramBinaryType::Executable,
            options,
        )
    }

    fn program_build(&self, context: ContextHandle, program: ProgramHandle, options: Option<&str>) -> NativeResult<()> {
        let mut state = self.begin(SimOp::ProgramBuild)?;
        state.store.plugin(context.id(), "context")?;
        Self::transition(
            &mut state,
            program,
            None,
            &[ProgramBinaryType::None],
            ProgramBinaryType::Executable,
            options,
        )
    }

    fn program_link_exp(
        &self,
        context: ContextHandle,
        devices: &[DeviceHandle],
        programs: &[ProgramHandle],
        options: Option<&str>,
    ) -> NativeResult<ProgramHandle> {
        let mut state = self.begin_extended(SimOp::ProgramLinkExp, "program_link_exp")?;
        state.store.plugin(context.id(), "context")?;
        self.link(&mut state, programs, Some(devices), options)
    }

    fn program_link(
        &self,
        context: ContextHandle,
        programs: &[ProgramHandle],
        options: Option<&str>,
    ) -> NativeResult<ProgramHandle> {
        let mut state = self.begin(SimOp::ProgramLink)?;
        state.store.plugin(context.id(), "context")?;
        self.link(&mut state, programs, None, options)
    }

    fn kernel_create_with_native_handle(
        &self,
        native: NativeHandle,
        context: ContextHandle,
        program: Option<ProgramHandle>,
        properties: &NativeProperties,
    ) -> NativeResult<KernelHandle> {
        let mut state = self.begin(SimOp::KernelCreate)?;
        state.store.plugin(context.id(), "context")?;
        let owner = match state.store.native(native, "kernel")?.kind {
            NativeKind::Kernel { program } => program,
            _ => return Err(NativeError::InvalidNativeHandle { kind: "kernel", handle: native }),
        };
        match program {
            Some(program) => {
                if state.store.plugin(program.id(), "program")?.native != owner {
                    return Err(NativeError::invalid_value(format!("{native} does not belong to {program}")));
                }
            }
            None if self.config.kernel_requires_program => {
                return Err(NativeError::invalid_value("kernel import requires the owning program"));
            }
            None => {}
        }
        let refs = self.initial_refs();
        let id = state
            .store
            .wrap(PluginKind::Kernel, native, properties.is_native_handle_owned, refs);
        Ok(KernelHandle::new(id))
    }

    fn kernel_native_handle(&self, kernel: KernelHandle) -> NativeResult<NativeHandle> {
        let state = self.begin(SimOp::KernelNativeHandle)?;
        state.store.plugin_native(kernel.id(), "kernel")
    }

    fn kernel_retain(&self, kernel: KernelHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::KernelRetain)?;
        state.store.retain_plugin(kernel.id(), "kernel")
    }

    fn kernel_release(&self, kernel: KernelHandle) -> NativeResult<()> {
        let mut state = self.begin(SimOp::KernelRelease)?;
        state.store.release_plugin(kernel.id(), "kernel")
    }

    fn mem_native_handle(&self, mem: MemHandle, device: DeviceHandle) -> NativeResult<NativeHandle> {
        let state = self.begin(SimOp::MemNativeHandle)?;
        state.store.plugin(device.id(), "device")?;
        state
            .store
            .plugin_native(mem.id(), "mem")
            .map_err(|_| NativeError::InvalidMemObject(mem.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        sim: SimBackend,
        devices: Vec<NativeHandle>,
        context: ContextHandle,
    }

    fn fixture(config: SimConfig, device_count: usize) -> Fixture {
        let sim = SimBackend::new(config);
        let platform = sim.create_platform();
        let devices: Vec<_> = (0..device_count).map(|_| sim.create_device(platform).unwrap()).collect();
        let native_context = sim.create_context(&devices).unwrap();
        let context = sim
            .context_create_with_native_handle(native_context, &[], &NativeProperties::borrowed())
            .unwrap();
        Fixture { sim, devices, context }
    }

    #[test]
    fn test_build_exp_per_device() {
        let f = fixture(SimConfig::cuda(), 2);
        let native = f
            .sim
            .create_program(&f.devices, ProgramBinaryType::None, &["k"])
            .unwrap();
        let program = f
            .sim
            .program_create_with_native_handle(native, f.context, &NativeProperties::borrowed())
            .unwrap();
        let devices = f.sim.program_devices(program).unwrap();

        f.sim.program_build_exp(program, &devices[..1], Some("-O2")).unwrap();

        assert_eq!(f.sim.program_binary_type(program, devices[0]).unwrap(), ProgramBinaryType::Executable);
        assert_eq!(f.sim.program_binary_type(program, devices[1]).unwrap(), ProgramBinaryType::None);
        assert_eq!(f.sim.last_options().as_deref(), Some("-O2"));
    }

    #[test]
    fn test_extended_unsupported_when_legacy_only() {
        let f = fixture(SimConfig::cuda().legacy_only(), 1);
        let native = f.sim.create_program(&f.devices, ProgramBinaryType::None, &[]).unwrap();
        let program = f
            .sim
            .program_create_with_native_handle(native, f.context, &NativeProperties::borrowed())
            .unwrap();
        let devices = f.sim.program_devices(program).unwrap();

        let err = f.sim.program_compile_exp(program, &devices, None).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(f.sim.call_count(SimOp::ProgramCompileExp), 1);

        f.sim.program_compile(f.context, program, None).unwrap();
        assert_eq!(
            f.sim.program_binary_type(program, devices[0]).unwrap(),
            ProgramBinaryType::CompiledObject
        );
    }

    #[test]
    fn test_link_creates_new_owned_program() {
        let f = fixture(SimConfig::cuda(), 1);
        let native = f
            .sim
            .create_program(&f.devices, ProgramBinaryType::Library, &["a", "b"])
            .unwrap();
        let program = f
            .sim
            .program_create_with_native_handle(native, f.context, &NativeProperties::borrowed())
            .unwrap();

        let linked = f.sim.program_link(f.context, &[program], None).unwrap();
        assert_ne!(linked, program);

        let linked_native = f.sim.program_native(linked).unwrap();
        assert_ne!(linked_native, native);
        assert_eq!(f.sim.program_stage(linked_native, f.devices[0]), Some(ProgramBinaryType::Executable));
        assert_eq!(f.sim.program_kernel_names(linked).unwrap(), vec!["a", "b"]);

        f.sim.program_release(linked).unwrap();
        assert!(!f.sim.is_alive(linked_native));
    }

    #[test]
    fn test_link_rejects_unbuilt() {
        let f = fixture(SimConfig::cuda(), 1);
        let native = f.sim.create_program(&f.devices, ProgramBinaryType::None, &[]).unwrap();
        let program = f
            .sim
            .program_create_with_native_handle(native, f.context, &NativeProperties::borrowed())
            .unwrap();

        let err = f.sim.program_link(f.context, &[program], None).unwrap_err();
        assert!(matches!(err, NativeError::LinkFailure { .. }));
    }

    #[test]
    fn test_import_without_retain_starts_at_zero() {
        let f = fixture(SimConfig::opencl(), 1);
        let native = f.sim.create_event();
        let event = f
            .sim
            .event_create_with_native_handle(native, f.context, &NativeProperties::owned())
            .unwrap();

        assert_eq!(f.sim.plugin_ref_count(event.id()), Some(0));
        assert!(f.sim.event_release(event).is_err());

        f.sim.event_retain(event).unwrap();
        f.sim.event_release(event).unwrap();
        assert!(!f.sim.is_alive(native));
    }

    #[test]
    fn test_kernel_requires_program() {
        let f = fixture(SimConfig::level_zero(), 1);
        let program = f.sim.create_program(&f.devices, ProgramBinaryType::Executable, &["k"]).unwrap();
        let kernel = f.sim.create_kernel(program, "k").unwrap();

        let err = f
            .sim
            .kernel_create_with_native_handle(kernel, f.context, None, &NativeProperties::borrowed())
            .unwrap_err();
        assert!(matches!(err, NativeError::InvalidValue(_)));
    }

    #[test]
    fn test_kernel_checked_against_owning_program() {
        let f = fixture(SimConfig::level_zero(), 1);
        let owner = f.sim.create_program(&f.devices, ProgramBinaryType::Executable, &["k"]).unwrap();
        let other = f.sim.create_program(&f.devices, ProgramBinaryType::Executable, &["k"]).unwrap();
        let kernel = f.sim.create_kernel(owner, "k").unwrap();
        let borrowed = NativeProperties::borrowed();
        let owner = f.sim.program_create_with_native_handle(owner, f.context, &borrowed).unwrap();
        let other = f.sim.program_create_with_native_handle(other, f.context, &borrowed).unwrap();

        let err = f
            .sim
            .kernel_create_with_native_handle(kernel, f.context, Some(other), &borrowed)
            .unwrap_err();
        assert!(matches!(err, NativeError::InvalidValue(_)));
        assert!(f
            .sim
            .kernel_create_with_native_handle(kernel, f.context, Some(owner), &borrowed)
            .is_ok());
    }

    #[test]
    fn test_create_kernel_needs_defined_name() {
        let f = fixture(SimConfig::cuda(), 1);
        let program = f.sim.create_program(&f.devices, ProgramBinaryType::Executable, &["k"]).unwrap();

        assert!(matches!(
            f.sim.create_kernel(program, "missing"),
            Err(NativeError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let f = fixture(SimConfig::cuda(), 1);
        f.sim.inject_failure(SimOp::EventCreate, NativeError::Other("boom".into()));
        let native = f.sim.create_event();

        assert!(f
            .sim
            .event_create_with_native_handle(native, f.context, &NativeProperties::borrowed())
            .is_err());
        assert!(f
            .sim
            .event_create_with_native_handle(native, f.context, &NativeProperties::borrowed())
            .is_ok());
    }

    #[test]
    fn test_queue_native_desc_round_trip() {
        let f = fixture(SimConfig::level_zero(), 1);
        let native = f.sim.create_queue(f.devices[0]).unwrap();
        let properties = QueueNativeProperties {
            native: NativeProperties::borrowed(),
            flags: QueueFlags {
                out_of_order: false,
                profiling: true,
            },
            native_desc: 3,
        };
        let queue = f
            .sim
            .queue_create_with_native_handle(native, f.context, None, &properties)
            .unwrap();

        let mut desc = 0;
        assert_eq!(f.sim.queue_native_handle(queue, &mut desc).unwrap(), native);
        assert_eq!(desc, 3);
        assert_eq!(f.sim.queue_flags(queue), Some(properties.flags));
    }
}
