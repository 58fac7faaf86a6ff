//! Native-object interop for the hologram runtime
//!
//! This crate imports objects created directly against a compute backend
//! (programs, kernels, queues, events, contexts, devices, platforms) into
//! the runtime's managed object model, and hands native handles back out.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   ↓ import_program(native, context, keep_ownership, target, backend)
//! BackendRegistry::resolve        backend → Plugin (function table + traits)
//!   ↓
//! Ownership                       keep_ownership → NativeProperties
//!   ↓
//! Reconciler                      per device: binary type → compile/build/link
//!   ↓
//! DeviceImage + KernelBundle      devices resolved through their platforms
//!   ↓ optionally
//! import_kernel                   single-image check, explicit retain
//! ```
//!
//! # Usage
//!
//! ```rust
//! use hologram_interop::{import, Backend, BackendRegistry, BundleState};
//! use hologram_native::sim::{SimBackend, SimConfig};
//! use hologram_native::ProgramBinaryType;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sim = SimBackend::new(SimConfig::cuda());
//! let registry = BackendRegistry::builder()
//!     .register(Backend::Cuda, Arc::new(sim.clone()))
//!     .build();
//!
//! let platform = sim.create_platform();
//! let device = sim.create_device(platform)?;
//! let context = import::make_context(&registry, sim.create_context(&[device])?, Backend::Cuda)?;
//! let program = sim.create_program(&[device], ProgramBinaryType::None, &["saxpy"])?;
//!
//! let bundle = import::import_program(&registry, program, &context, true, BundleState::Executable, Backend::Cuda)?;
//! assert_eq!(bundle.size(), 1);
//! assert!(bundle.has_kernel("saxpy")?);
//! # Ok(())
//! # }
//! ```
//!
//! The free functions at the crate root do the same against the
//! process-wide registry ([`registry::global`]).

pub mod backend;
pub mod bundle;
pub mod config;
pub mod error;
pub mod import;
pub mod interop_handle;
pub mod objects;
pub mod ownership;
pub mod reconcile;
pub mod registry;

// Re-export public API
pub use backend::{Backend, BackendTraits};
pub use bundle::{BundleState, DeviceImage, KernelBundle, KernelId};
pub use config::InteropConfig;
pub use error::{BuildOperation, InteropError, Result};
pub use interop_handle::{InteropHandle, RequirementId};
pub use objects::{Context, Device, Event, Kernel, Platform, Queue, QueueProperties};
pub use ownership::Ownership;
pub use reconcile::{plan_transition, BuildAction};
pub use registry::{resolve_backend, BackendRegistry, BackendRegistryBuilder, Plugin};

use hologram_native::NativeHandle;

/// [`import::import_program`] against the process-wide registry
pub fn import_program(
    native: NativeHandle,
    context: &Context,
    keep_ownership: bool,
    target: BundleState,
    backend: Backend,
) -> Result<KernelBundle> {
    import::import_program(registry::global(), native, context, keep_ownership, target, backend)
}

/// [`import::import_kernel`] against the process-wide registry
pub fn import_kernel(
    context: &Context,
    bundle: &KernelBundle,
    native: NativeHandle,
    keep_ownership: bool,
    backend: Backend,
) -> Result<Kernel> {
    import::import_kernel(registry::global(), context, bundle, native, keep_ownership, backend)
}

/// [`import::make_kernel`] against the process-wide registry
pub fn make_kernel(native: NativeHandle, context: &Context, backend: Backend) -> Result<Kernel> {
    import::make_kernel(registry::global(), native, context, backend)
}

/// [`import::make_platform`] against the process-wide registry
pub fn make_platform(native: NativeHandle, backend: Backend) -> Result<Platform> {
    import::make_platform(registry::global(), native, backend)
}

/// [`import::make_device`] against the process-wide registry
pub fn make_device(native: NativeHandle, backend: Backend) -> Result<Device> {
    import::make_device(registry::global(), native, backend)
}

/// [`import::make_context`] against the process-wide registry
pub fn make_context(native: NativeHandle, backend: Backend) -> Result<Context> {
    import::make_context(registry::global(), native, backend)
}

/// [`import::make_queue`] against the process-wide registry
pub fn make_queue(
    native: NativeHandle,
    native_desc: i32,
    context: &Context,
    device: Option<&Device>,
    keep_ownership: bool,
    properties: &QueueProperties,
    backend: Backend,
) -> Result<Queue> {
    import::make_queue(
        registry::global(),
        native,
        native_desc,
        context,
        device,
        keep_ownership,
        properties,
        backend,
    )
}

/// [`import::make_event`] against the process-wide registry
pub fn make_event(native: NativeHandle, context: &Context, keep_ownership: bool, backend: Backend) -> Result<Event> {
    import::make_event(registry::global(), native, context, keep_ownership, backend)
}
