//! Device images and kernel bundles
//!
//! ```text
//! KernelBundle
//! ├── context, devices, state
//! └── DeviceImage (one or more)
//!     ├── ImportedProgram (current)     released on drop
//!     ├── ImportedProgram (superseded)  released on drop
//!     └── kernel ids                    queried on first use
//! ```
//!
//! Both types are immutable after construction and cheap to clone.

use crate::error::{InteropError, Result};
use crate::objects::{Context, Device};
use crate::registry::Plugin;
use hologram_native::ProgramHandle;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Requested build state of a kernel bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleState {
    Input,
    Object,
    Executable,
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Object => "object",
            Self::Executable => "executable",
        })
    }
}

/// Name of a kernel defined by a device image
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(String);

impl KernelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One plugin-level program reference, released on drop
pub(crate) struct ImportedProgram {
    handle: ProgramHandle,
    plugin: Plugin,
}

impl ImportedProgram {
    pub(crate) fn new(handle: ProgramHandle, plugin: Plugin) -> Self {
        Self { handle, plugin }
    }

    pub(crate) fn handle(&self) -> ProgramHandle {
        self.handle
    }
}

impl Drop for ImportedProgram {
    fn drop(&mut self) {
        match self.plugin.api().program_release(self.handle) {
            Ok(()) => tracing::trace!(program = %self.handle, "released program"),
            Err(error) => tracing::warn!(program = %self.handle, %error, "failed to release program"),
        }
    }
}

/// Program reached by reconciliation, plus the handles it replaced
pub(crate) struct ReconciledProgram {
    pub(crate) current: ImportedProgram,
    pub(crate) superseded: Vec<ImportedProgram>,
}

/// Native program for a set of devices, at one build state
#[derive(Clone)]
pub struct DeviceImage {
    inner: Arc<DeviceImageInner>,
}

struct DeviceImageInner {
    // Field order: the current program is released before the handles it superseded.
    program: ImportedProgram,
    superseded: Vec<ImportedProgram>,
    devices: Vec<Device>,
    state: BundleState,
    kernel_ids: OnceLock<Vec<KernelId>>,
}

impl DeviceImage {
    pub(crate) fn new(program: ReconciledProgram, devices: Vec<Device>, state: BundleState) -> Self {
        Self {
            inner: Arc::new(DeviceImageInner {
                program: program.current,
                superseded: program.superseded,
                devices,
                state,
                kernel_ids: OnceLock::new(),
            }),
        }
    }

    /// Plugin program the image refers to (the last one produced by link, if any)
    pub fn program_handle(&self) -> ProgramHandle {
        self.inner.program.handle()
    }

    /// Program handles replaced during reconciliation, oldest first
    pub fn superseded_programs(&self) -> Vec<ProgramHandle> {
        self.inner.superseded.iter().map(ImportedProgram::handle).collect()
    }

    pub fn devices(&self) -> &[Device] {
        &self.inner.devices
    }

    pub fn state(&self) -> BundleState {
        self.inner.state
    }

    /// Kernels the image defines
    ///
    /// Queried from the backend on first use, and only for executable images;
    /// images in other states report none, since their programs may still
    /// reference undefined symbols.
    pub fn kernel_ids(&self) -> Result<&[KernelId]> {
        if let Some(ids) = self.inner.kernel_ids.get() {
            return Ok(ids);
        }
        let ids = match self.inner.state {
            BundleState::Executable => self
                .inner
                .program
                .plugin
                .api()
                .program_kernel_names(self.inner.program.handle())?
                .into_iter()
                .map(KernelId::new)
                .collect(),
            BundleState::Input | BundleState::Object => Vec::new(),
        };
        Ok(self.inner.kernel_ids.get_or_init(|| ids))
    }

    pub fn has_kernel(&self, name: &str) -> Result<bool> {
        Ok(self.kernel_ids()?.iter().any(|id| id.name() == name))
    }
}

impl fmt::Debug for DeviceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceImage")
            .field("program", &self.inner.program.handle())
            .field("superseded", &self.superseded_programs())
            .field("devices", &self.inner.devices.len())
            .field("state", &self.inner.state)
            .finish()
    }
}

/// Device images sharing one context and build state
#[derive(Clone)]
pub struct KernelBundle {
    inner: Arc<KernelBundleInner>,
}

struct KernelBundleInner {
    context: Context,
    devices: Vec<Device>,
    state: BundleState,
    images: Vec<DeviceImage>,
}

impl KernelBundle {
    pub(crate) fn new(context: Context, devices: Vec<Device>, state: BundleState, images: Vec<DeviceImage>) -> Self {
        Self {
            inner: Arc::new(KernelBundleInner {
                context,
                devices,
                state,
                images,
            }),
        }
    }

    /// Bundle without images or devices
    pub fn empty(context: &Context, state: BundleState) -> Self {
        Self::new(context.clone(), Vec::new(), state, Vec::new())
    }

    /// Concatenate the images of `bundles`
    ///
    /// All bundles must share context and state. Devices are de-duplicated,
    /// keeping first-seen order.
    pub fn join(bundles: &[KernelBundle]) -> Result<KernelBundle> {
        let (first, rest) = bundles
            .split_first()
            .ok_or_else(|| InteropError::IncompatibleBundles("no bundles to join".to_string()))?;

        for bundle in rest {
            if bundle.context() != first.context() {
                return Err(InteropError::IncompatibleBundles("bundles belong to different contexts".to_string()));
            }
            if bundle.state() != first.state() {
                return Err(InteropError::IncompatibleBundles(format!(
                    "cannot join {} bundle with {} bundle",
                    first.state(),
                    bundle.state()
                )));
            }
        }

        let mut devices: Vec<Device> = Vec::new();
        let mut images = Vec::new();
        for bundle in bundles {
            for device in bundle.devices() {
                if !devices.contains(device) {
                    devices.push(device.clone());
                }
            }
            images.extend(bundle.images().iter().cloned());
        }
        Ok(Self::new(first.context().clone(), devices, first.state(), images))
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn devices(&self) -> &[Device] {
        &self.inner.devices
    }

    pub fn state(&self) -> BundleState {
        self.inner.state
    }

    pub fn images(&self) -> &[DeviceImage] {
        &self.inner.images
    }

    /// Number of device images
    pub fn size(&self) -> usize {
        self.inner.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.images.is_empty()
    }

    /// Kernels of every image, de-duplicated and sorted
    pub fn kernel_ids(&self) -> Result<Vec<KernelId>> {
        let mut ids = Vec::new();
        for image in self.images() {
            ids.extend_from_slice(image.kernel_ids()?);
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    pub fn has_kernel(&self, name: &str) -> Result<bool> {
        for image in self.images() {
            if image.has_kernel(name)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Debug for KernelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelBundle")
            .field("context", &self.inner.context.handle())
            .field("devices", &self.inner.devices)
            .field("state", &self.inner.state)
            .field("images", &self.inner.images)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::import::objects::make_context;
    use crate::registry::BackendRegistry;
    use hologram_native::sim::{SimBackend, SimConfig};
    use hologram_native::NativeApi;

    fn cuda_context() -> (SimBackend, BackendRegistry, Context) {
        let sim = SimBackend::new(SimConfig::cuda());
        let registry = BackendRegistry::builder()
            .register(Backend::Cuda, Arc::new(sim.clone()))
            .build();
        let native = sim.create_context(&[]).unwrap();
        let context = make_context(&registry, native, Backend::Cuda).unwrap();
        (sim, registry, context)
    }

    #[test]
    fn test_empty_bundle() {
        let (_sim, _registry, context) = cuda_context();
        let bundle = KernelBundle::empty(&context, BundleState::Executable);
        assert_eq!(bundle.size(), 0);
        assert!(bundle.is_empty());
        assert!(bundle.devices().is_empty());
        assert!(!bundle.has_kernel("anything").unwrap());
    }

    #[test]
    fn test_join_rejects_mixed_states() {
        let (_sim, _registry, context) = cuda_context();
        let a = KernelBundle::empty(&context, BundleState::Executable);
        let b = KernelBundle::empty(&context, BundleState::Object);
        assert!(matches!(
            KernelBundle::join(&[a, b]),
            Err(InteropError::IncompatibleBundles(_))
        ));
    }

    #[test]
    fn test_join_rejects_mixed_contexts() {
        let (_sim, _registry, first) = cuda_context();
        let (_other_sim, _other_registry, second) = cuda_context();
        let a = KernelBundle::empty(&first, BundleState::Input);
        let b = KernelBundle::empty(&second, BundleState::Input);
        assert!(KernelBundle::join(&[a, b]).is_err());
        assert!(KernelBundle::join(&[]).is_err());
    }

    #[test]
    fn test_imported_program_released_once_on_drop() {
        let (sim, registry, context) = cuda_context();
        let plugin = registry.resolve(Backend::Cuda).unwrap();
        let platform = sim.create_platform();
        let device = sim.create_device(platform).unwrap();
        let native = sim
            .create_program(&[device], hologram_native::ProgramBinaryType::Executable, &[])
            .unwrap();
        let handle = sim
            .program_create_with_native_handle(native, context.handle(), &hologram_native::NativeProperties::owned())
            .unwrap();

        drop(ImportedProgram::new(handle, plugin));

        assert_eq!(sim.plugin_ref_count(handle.id()), None);
        assert!(!sim.is_alive(native));
    }
}
