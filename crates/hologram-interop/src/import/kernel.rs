//! Native kernel import

use crate::backend::Backend;
use crate::bundle::{BundleState, KernelBundle};
use crate::error::{InteropError, Result};
use crate::import::retain_or_release;
use crate::objects::{Context, Kernel};
use crate::ownership::Ownership;
use crate::registry::BackendRegistry;
use hologram_native::NativeHandle;
use hologram_tracing::ImportTimer;

/// Import a native kernel belonging to `bundle`
///
/// `bundle` must be executable. Backends that create kernels from their program need `bundle` to hold
/// exactly one image, whose program is handed to the native call; other
/// backends get no program.
#[tracing::instrument(skip(registry, context, bundle), fields(images = bundle.size()))]
pub fn import_kernel(
    registry: &BackendRegistry,
    context: &Context,
    bundle: &KernelBundle,
    native: NativeHandle,
    keep_ownership: bool,
    backend: Backend,
) -> Result<Kernel> {
    let _timer = ImportTimer::start("import_kernel");
    let plugin = registry.resolve(backend)?;
    let traits = plugin.traits();

    if bundle.state() != BundleState::Executable {
        return Err(InteropError::BundleNotExecutable { state: bundle.state() });
    }

    let program = if traits.kernel_import_requires_program {
        match bundle.images() {
            [image] => Some(image.program_handle()),
            images => return Err(InteropError::InvalidBundleShape { images: images.len() }),
        }
    } else {
        None
    };

    let ownership = Ownership::from_keep_ownership(keep_ownership);
    let api = plugin.api();
    let properties = ownership.native_properties();
    let handle = api.kernel_create_with_native_handle(native, context.handle(), program, &properties)?;
    if traits.needs_explicit_retain_on_import {
        retain_or_release(handle, |kernel| api.kernel_retain(kernel), |kernel| api.kernel_release(kernel))?;
    }
    tracing::debug!(kernel = %handle, ?program, ?ownership, "imported kernel");

    Ok(Kernel::new(handle, context.clone(), bundle.clone(), plugin))
}

/// Import a native kernel with no bundle of its own
///
/// The kernel gets an empty executable bundle and the runtime takes
/// ownership of the native kernel.
pub fn make_kernel(
    registry: &BackendRegistry,
    native: NativeHandle,
    context: &Context,
    backend: Backend,
) -> Result<Kernel> {
    let bundle = KernelBundle::empty(context, BundleState::Executable);
    import_kernel(registry, context, &bundle, native, false, backend)
}
