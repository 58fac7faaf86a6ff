//! Platform, device, context, queue and event import

use crate::backend::Backend;
use crate::error::{InteropError, Result};
use crate::import::{resolve_devices, retain_or_release};
use crate::objects::{Context, Device, Event, Platform, Queue, QueueProperties};
use crate::ownership::Ownership;
use crate::registry::BackendRegistry;
use hologram_native::{NativeHandle, NativeProperties, QueueNativeProperties};

/// Import a native platform; the same platform always yields the same object
#[tracing::instrument(skip(registry))]
pub fn make_platform(registry: &BackendRegistry, native: NativeHandle, backend: Backend) -> Result<Platform> {
    let plugin = registry.resolve(backend)?;
    let handle = plugin.api().platform_create_with_native_handle(native)?;
    Ok(Platform::get_or_make(handle, &plugin))
}

/// Import a native device through its platform; idempotent
#[tracing::instrument(skip(registry))]
pub fn make_device(registry: &BackendRegistry, native: NativeHandle, backend: Backend) -> Result<Device> {
    let plugin = registry.resolve(backend)?;
    let handle = plugin.api().device_create_with_native_handle(native, None)?;
    let mut devices = resolve_devices(&plugin, &[handle])?;
    devices
        .pop()
        .ok_or_else(|| InteropError::InvalidNativeObject(format!("no device for {native}")))
}

/// Import a native context; the caller always keeps ownership
#[tracing::instrument(skip(registry))]
pub fn make_context(registry: &BackendRegistry, native: NativeHandle, backend: Backend) -> Result<Context> {
    let plugin = registry.resolve(backend)?;
    let api = plugin.api();
    let handle = api.context_create_with_native_handle(native, &[], &NativeProperties::borrowed())?;
    if plugin.traits().needs_explicit_retain_on_import {
        retain_or_release(handle, |context| api.context_retain(context), |context| api.context_release(context))?;
    }
    Ok(Context::new(handle, plugin))
}

/// Import a native queue
///
/// `native_desc` is the backend-specific queue descriptor. Without `device`
/// the queue's device is asked from the backend. A `compute_index` property
/// is rejected.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip(registry, context, device))]
pub fn make_queue(
    registry: &BackendRegistry,
    native: NativeHandle,
    native_desc: i32,
    context: &Context,
    device: Option<&Device>,
    keep_ownership: bool,
    properties: &QueueProperties,
    backend: Backend,
) -> Result<Queue> {
    if properties.compute_index.is_some() {
        return Err(InteropError::InvalidProperty(
            "queue create using make_queue cannot have compute_index property".to_string(),
        ));
    }

    let plugin = registry.resolve(backend)?;
    let api = plugin.api();
    let native_properties = QueueNativeProperties {
        native: Ownership::from_keep_ownership(keep_ownership).native_properties(),
        flags: properties.flags(),
        native_desc,
    };
    let handle = api.queue_create_with_native_handle(
        native,
        context.handle(),
        device.map(Device::handle),
        &native_properties,
    )?;
    if plugin.traits().needs_explicit_retain_on_import {
        retain_or_release(handle, |queue| api.queue_retain(queue), |queue| api.queue_release(queue))?;
    }

    let device = match device {
        Some(device) => device.clone(),
        None => {
            let resolved = api
                .queue_device(handle)
                .map_err(InteropError::from)
                .and_then(|device| resolve_devices(&plugin, &[device]))
                .and_then(|mut devices| {
                    devices
                        .pop()
                        .ok_or_else(|| InteropError::InvalidNativeObject(format!("no device for queue {handle}")))
                });
            match resolved {
                Ok(device) => device,
                Err(error) => {
                    if let Err(release_error) = api.queue_release(handle) {
                        tracing::warn!(queue = %handle, %release_error, "failed to release queue");
                    }
                    return Err(error);
                }
            }
        }
    };

    Ok(Queue::new(handle, context.clone(), device, *properties, plugin))
}

/// Import a native event
#[tracing::instrument(skip(registry, context))]
pub fn make_event(
    registry: &BackendRegistry,
    native: NativeHandle,
    context: &Context,
    keep_ownership: bool,
    backend: Backend,
) -> Result<Event> {
    let plugin = registry.resolve(backend)?;
    let api = plugin.api();
    let properties = Ownership::from_keep_ownership(keep_ownership).native_properties();
    let handle = api.event_create_with_native_handle(native, context.handle(), &properties)?;
    if plugin.traits().needs_explicit_retain_on_import {
        retain_or_release(handle, |event| api.event_retain(event), |event| api.event_release(event))?;
    }
    Ok(Event::new(handle, context.clone(), plugin))
}
