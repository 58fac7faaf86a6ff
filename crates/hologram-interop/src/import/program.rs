//! Native program import
//!
//! Wraps a native program, reconciles its build state on every device it is
//! associated with, and assembles the result into a single-image
//! [`KernelBundle`].

use crate::backend::Backend;
use crate::bundle::{BundleState, DeviceImage, ImportedProgram, KernelBundle};
use crate::error::Result;
use crate::import::{resolve_devices, retain_or_release};
use crate::objects::Context;
use crate::ownership::Ownership;
use crate::reconcile::Reconciler;
use crate::registry::BackendRegistry;
use hologram_native::{NativeError, NativeHandle};
use hologram_tracing::ImportTimer;

/// Import a native program as a kernel bundle in state `target`
///
/// With `keep_ownership` the caller's program reference is left alone;
/// otherwise the bundle's image releases it when dropped.
///
/// Errors: [`UnsupportedBackend`](crate::InteropError::UnsupportedBackend),
/// [`BuildStateMismatch`](crate::InteropError::BuildStateMismatch),
/// [`BuildFailed`](crate::InteropError::BuildFailed), or
/// [`Native`](crate::InteropError::Native) for any other native failure.
/// Devices reconciled before a failure stay reconciled.
#[tracing::instrument(skip(registry, context))]
pub fn import_program(
    registry: &BackendRegistry,
    native: NativeHandle,
    context: &Context,
    keep_ownership: bool,
    target: BundleState,
    backend: Backend,
) -> Result<KernelBundle> {
    let _timer = ImportTimer::start("import_program");
    let plugin = registry.resolve(backend)?;
    let api = plugin.api();
    let ownership = Ownership::from_keep_ownership(keep_ownership);

    let handle = api.program_create_with_native_handle(native, context.handle(), &ownership.native_properties())?;
    if plugin.traits().needs_explicit_retain_on_import {
        retain_or_release(handle, |program| api.program_retain(program), |program| api.program_release(program))?;
    }
    let program = ImportedProgram::new(handle, plugin.clone());

    let num_devices = api.program_num_devices(handle)?;
    let devices = api.program_devices(handle)?;
    if devices.len() != num_devices as usize {
        return Err(NativeError::invalid_value(format!(
            "{handle} reports {num_devices} devices but lists {}",
            devices.len()
        ))
        .into());
    }
    tracing::debug!(program = %handle, devices = devices.len(), ?ownership, "imported program");

    let reconciled = Reconciler::new(&plugin, context, registry.config()).reconcile(program, &devices, target)?;
    let devices = resolve_devices(&plugin, &devices)?;
    let image = DeviceImage::new(reconciled, devices.clone(), target);

    Ok(KernelBundle::new(context.clone(), devices, target, vec![image]))
}
