//! Import entry points taking an explicit registry
//!
//! The crate root re-exposes each of these against the process-wide
//! registry.

pub mod kernel;
pub mod objects;
pub mod program;

pub use kernel::{import_kernel, make_kernel};
pub use objects::{make_context, make_device, make_event, make_platform, make_queue};
pub use program::import_program;

use crate::error::Result;
use crate::objects::{Device, Platform};
use crate::registry::Plugin;
use hologram_native::{DeviceHandle, NativeResult};
use std::fmt;

/// Managed devices for plugin device handles, in the same order
///
/// Each device is found or created through its owning platform.
pub(crate) fn resolve_devices(plugin: &Plugin, devices: &[DeviceHandle]) -> Result<Vec<Device>> {
    devices
        .iter()
        .map(|&device| Ok(Platform::from_device_handle(device, plugin)?.get_or_make_device(device)))
        .collect()
}

/// Take the runtime's explicit reference on a freshly created handle
///
/// When the retain fails the handle is released again before the error is
/// returned, so nothing is left behind for the caller to clean up.
pub(crate) fn retain_or_release<H: Copy + fmt::Display>(
    handle: H,
    retain: impl FnOnce(H) -> NativeResult<()>,
    release: impl FnOnce(H) -> NativeResult<()>,
) -> Result<()> {
    let Err(error) = retain(handle) else {
        return Ok(());
    };
    if let Err(release_error) = release(handle) {
        tracing::warn!(%handle, %release_error, "failed to release handle after failed retain");
    }
    Err(error.into())
}
