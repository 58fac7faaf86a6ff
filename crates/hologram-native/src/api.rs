//! Native function table
//!
//! [`NativeApi`] is the set of native operations the runtime invokes on a
//! backend. One implementation exists per backend; the runtime resolves it
//! once per call and threads it through.
//!
//! # Extended vs. legacy entry points
//!
//! `compile`, `build` and `link` each come in two forms:
//!
//! ```text
//! program_compile_exp(program, devices, ..)   per-device, "extended"
//! program_compile(context, program, ..)       whole program, legacy
//! ```
//!
//! The extended forms have default implementations returning
//! [`NativeError::UnsupportedFeature`], so a backend that only ships the
//! legacy entry point simply does not override them.
//!
//! # Reference counting
//!
//! Every `*_create_with_native_handle` takes [`NativeProperties`] saying
//! whether the new plugin object owns the native object. Whether creation
//! itself takes a plugin-level reference is backend-specific; callers that
//! need a guaranteed reference on backends that do not take one issue an
//! explicit `*_retain`.

use crate::error::{NativeError, NativeResult};
use crate::handle::{
    ContextHandle, DeviceHandle, EventHandle, KernelHandle, MemHandle, NativeHandle, PlatformHandle, ProgramHandle,
    QueueHandle,
};
use crate::types::{NativeProperties, NativePlatformBackend, ProgramBinaryType, QueueNativeProperties};

/// Native function table of one compute backend
///
/// All methods take `&self`; implementations synchronise internally so a
/// single table can be shared across threads.
pub trait NativeApi: Send + Sync {
    /// Human-readable backend name, used in logs
    fn name(&self) -> &str;

    // ============================================================================================
    // Platforms & Devices
    // ============================================================================================

    /// Wrap a native platform
    fn platform_create_with_native_handle(&self, native: NativeHandle) -> NativeResult<PlatformHandle>;

    /// Backend kind the platform reports about itself
    fn platform_backend(&self, platform: PlatformHandle) -> NativeResult<NativePlatformBackend>;

    /// Native handle behind a platform
    fn platform_native_handle(&self, platform: PlatformHandle) -> NativeResult<NativeHandle>;

    /// Wrap a native device
    ///
    /// Wrapping the same native device twice yields the same device handle.
    fn device_create_with_native_handle(
        &self,
        native: NativeHandle,
        platform: Option<PlatformHandle>,
    ) -> NativeResult<DeviceHandle>;

    /// Platform a device belongs to
    fn device_platform(&self, device: DeviceHandle) -> NativeResult<PlatformHandle>;

    /// Native handle behind a device
    fn device_native_handle(&self, device: DeviceHandle) -> NativeResult<NativeHandle>;

    // ============================================================================================
    // Contexts
    // ============================================================================================

    /// Wrap a native context
    fn context_create_with_native_handle(
        &self,
        native: NativeHandle,
        devices: &[DeviceHandle],
        properties: &NativeProperties,
    ) -> NativeResult<ContextHandle>;

    /// Native handle behind a context
    fn context_native_handle(&self, context: ContextHandle) -> NativeResult<NativeHandle>;

    /// Take one plugin-level reference to a context
    fn context_retain(&self, context: ContextHandle) -> NativeResult<()>;

    /// Drop one plugin-level reference to a context
    fn context_release(&self, context: ContextHandle) -> NativeResult<()>;

    // ============================================================================================
    // Queues
    // ============================================================================================

    /// Wrap a native command queue
    fn queue_create_with_native_handle(
        &self,
        native: NativeHandle,
        context: ContextHandle,
        device: Option<DeviceHandle>,
        properties: &QueueNativeProperties,
    ) -> NativeResult<QueueHandle>;

    /// Device a queue submits to
    fn queue_device(&self, queue: QueueHandle) -> NativeResult<DeviceHandle>;

    /// Native handle behind a queue; writes the queue's native descriptor
    fn queue_native_handle(&self, queue: QueueHandle, native_desc: &mut i32) -> NativeResult<NativeHandle>;

    /// Take one plugin-level reference to a queue
    fn queue_retain(&self, queue: QueueHandle) -> NativeResult<()>;

    /// Drop one plugin-level reference to a queue
    fn queue_release(&self, queue: QueueHandle) -> NativeResult<()>;

    // ============================================================================================
    // Events
    // ============================================================================================

    /// Wrap a native event
    fn event_create_with_native_handle(
        &self,
        native: NativeHandle,
        context: ContextHandle,
        properties: &NativeProperties,
    ) -> NativeResult<EventHandle>;

    /// Native handle behind an event
    fn event_native_handle(&self, event: EventHandle) -> NativeResult<NativeHandle>;

    /// Take one plugin-level reference to an event
    fn event_retain(&self, event: EventHandle) -> NativeResult<()>;

    /// Drop one plugin-level reference to an event
    fn event_release(&self, event: EventHandle) -> NativeResult<()>;

    // ============================================================================================
    // Programs
    // ============================================================================================

    /// Wrap a native program
    fn program_create_with_native_handle(
        &self,
        native: NativeHandle,
        context: ContextHandle,
        properties: &NativeProperties,
    ) -> NativeResult<ProgramHandle>;

    /// Take one plugin-level reference to a program
    fn program_retain(&self, program: ProgramHandle) -> NativeResult<()>;

    /// Drop one plugin-level reference to a program
    fn program_release(&self, program: ProgramHandle) -> NativeResult<()>;

    /// Number of devices the program is associated with
    fn program_num_devices(&self, program: ProgramHandle) -> NativeResult<u32>;

    /// Devices the program is associated with, in backend order
    fn program_devices(&self, program: ProgramHandle) -> NativeResult<Vec<DeviceHandle>>;

    /// Compilation stage of the program for one device
    fn program_binary_type(&self, program: ProgramHandle, device: DeviceHandle) -> NativeResult<ProgramBinaryType>;

    /// Names of the kernels the program defines
    fn program_kernel_names(&self, program: ProgramHandle) -> NativeResult<Vec<String>>;

    /// Compile the program for the given devices
    fn program_compile_exp(
        &self,
        _program: ProgramHandle,
        _devices: &[DeviceHandle],
        _options: Option<&str>,
    ) -> NativeResult<()> {
        Err(NativeError::UnsupportedFeature("program_compile_exp"))
    }

    /// Compile the program for all its devices
    fn program_compile(&self, context: ContextHandle, program: ProgramHandle, options: Option<&str>)
        -> NativeResult<()>;

    /// Compile and link the program for the given devices
    fn program_build_exp(
        &self,
        _program: ProgramHandle,
        _devices: &[DeviceHandle],
        _options: Option<&str>,
    ) -> NativeResult<()> {
        Err(NativeError::UnsupportedFeature("program_build_exp"))
    }

    /// Compile and link the program for all its devices
    fn program_build(&self, context: ContextHandle, program: ProgramHandle, options: Option<&str>) -> NativeResult<()>;

    /// Link programs for the given devices into a new program
    fn program_link_exp(
        &self,
        _context: ContextHandle,
        _devices: &[DeviceHandle],
        _programs: &[ProgramHandle],
        _options: Option<&str>,
    ) -> NativeResult<ProgramHandle> {
        Err(NativeError::UnsupportedFeature("program_link_exp"))
    }

    /// Link programs into a new program
    fn program_link(
        &self,
        context: ContextHandle,
        programs: &[ProgramHandle],
        options: Option<&str>,
    ) -> NativeResult<ProgramHandle>;

    // ============================================================================================
    // Kernels
    // ============================================================================================

    /// Wrap a native kernel
    ///
    /// Backends that need the owning program to create a kernel object
    /// receive it in `program`; others ignore it.
    fn kernel_create_with_native_handle(
        &self,
        native: NativeHandle,
        context: ContextHandle,
        program: Option<ProgramHandle>,
        properties: &NativeProperties,
    ) -> NativeResult<KernelHandle>;

    /// Native handle behind a kernel
    fn kernel_native_handle(&self, kernel: KernelHandle) -> NativeResult<NativeHandle>;

    /// Take one plugin-level reference to a kernel
    fn kernel_retain(&self, kernel: KernelHandle) -> NativeResult<()>;

    /// Drop one plugin-level reference to a kernel
    fn kernel_release(&self, kernel: KernelHandle) -> NativeResult<()>;

    // ============================================================================================
    // Memory
    // ============================================================================================

    /// Native handle behind a memory object as seen from `device`
    fn mem_native_handle(&self, mem: MemHandle, device: DeviceHandle) -> NativeResult<NativeHandle>;
}
