//! Backend resolution
//!
//! A [`BackendRegistry`] maps each linked [`Backend`] to the [`Plugin`]
//! wrapping its native function table. Registries are assembled once with
//! [`BackendRegistryBuilder`] and are immutable afterwards, so resolution
//! never takes a lock.
//!
//! The process-wide registry used by the crate-root entry points is created
//! lazily on first use. Without an explicit [`install`] it registers the
//! in-process reference backend for every linked backend, each configured
//! with that backend's native quirks.
//!
//! # Example
//!
//! ```
//! use hologram_interop::{Backend, BackendRegistry};
//! use hologram_native::sim::{SimBackend, SimConfig};
//! use std::sync::Arc;
//!
//! let registry = BackendRegistry::builder()
//!     .register(Backend::Cuda, Arc::new(SimBackend::new(SimConfig::cuda())))
//!     .build();
//!
//! assert!(registry.resolve(Backend::Cuda).is_ok());
//! assert!(registry.resolve(Backend::OpenCl).is_err());
//! assert!(registry.resolve(Backend::All).is_err());
//! ```

use crate::backend::{Backend, BackendTraits};
use crate::config::InteropConfig;
use crate::error::{InteropError, Result};
use crate::objects::platform::PlatformInner;
use hologram_native::sim::{SimBackend, SimConfig};
use hologram_native::{NativeApi, PlatformHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Native function table of one backend, with the runtime state kept per table
///
/// Cloning is cheap; clones share the table and its platform cache.
#[derive(Clone)]
pub struct Plugin {
    inner: Arc<PluginInner>,
}

struct PluginInner {
    backend: Backend,
    traits: BackendTraits,
    api: Arc<dyn NativeApi>,
    /// Managed platforms by plugin handle; entries die with their last user
    platforms: Mutex<HashMap<PlatformHandle, Weak<PlatformInner>>>,
}

impl Plugin {
    /// Wrap a function table using the backend's default traits
    pub fn new(backend: Backend, api: Arc<dyn NativeApi>) -> Self {
        Self::with_traits(backend, backend.traits(), api)
    }

    /// Wrap a function table with explicit traits
    pub fn with_traits(backend: Backend, traits: BackendTraits, api: Arc<dyn NativeApi>) -> Self {
        Self {
            inner: Arc::new(PluginInner {
                backend,
                traits,
                api,
                platforms: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn backend(&self) -> Backend {
        self.inner.backend
    }

    pub fn traits(&self) -> BackendTraits {
        self.inner.traits
    }

    /// The native function table
    pub fn api(&self) -> &dyn NativeApi {
        self.inner.api.as_ref()
    }

    /// Whether both values wrap the same table
    pub fn same_table(&self, other: &Plugin) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn platform_cache(&self) -> &Mutex<HashMap<PlatformHandle, Weak<PlatformInner>>> {
        &self.inner.platforms
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("backend", &self.inner.backend)
            .field("api", &self.inner.api.name())
            .field("traits", &self.inner.traits)
            .finish()
    }
}

/// Immutable map from backend to function table
pub struct BackendRegistry {
    plugins: HashMap<Backend, Plugin>,
    config: InteropConfig,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Registry backed by the in-process reference backend
    ///
    /// Every linked backend gets its own [`SimBackend`] with that backend's
    /// quirks. Options come from the environment.
    pub fn with_reference_backends() -> Self {
        Backend::LINKED
            .into_iter()
            .filter_map(|backend| reference_sim_config(backend).map(|config| (backend, config)))
            .fold(Self::builder(), |builder, (backend, config)| {
                builder.register(backend, Arc::new(SimBackend::new(config)))
            })
            .config(InteropConfig::from_env())
            .build()
    }

    /// Function table for `backend`
    ///
    /// Fails with [`InteropError::UnsupportedBackend`] for identifiers that
    /// are not linked and for linked ones without a registered table.
    pub fn resolve(&self, backend: Backend) -> Result<Plugin> {
        if !backend.is_linked() {
            return Err(InteropError::UnsupportedBackend(backend));
        }
        let plugin = self
            .plugins
            .get(&backend)
            .ok_or(InteropError::UnsupportedBackend(backend))?;
        tracing::trace!(%backend, api = plugin.api().name(), "resolved backend");
        Ok(plugin.clone())
    }

    /// Options applied to imported programs
    pub fn config(&self) -> &InteropConfig {
        &self.config
    }

    /// Registered backends, in [`Backend::LINKED`] order
    pub fn backends(&self) -> Vec<Backend> {
        Backend::LINKED
            .into_iter()
            .filter(|backend| self.plugins.contains_key(backend))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`BackendRegistry`]
#[derive(Default)]
pub struct BackendRegistryBuilder {
    plugins: HashMap<Backend, Plugin>,
    config: InteropConfig,
}

impl BackendRegistryBuilder {
    /// Register `api` for `backend` with the backend's default traits
    ///
    /// Registering a backend twice replaces the earlier table. Tables for
    /// backends that are not linked are kept but never resolved.
    pub fn register(self, backend: Backend, api: Arc<dyn NativeApi>) -> Self {
        self.register_plugin(Plugin::new(backend, api))
    }

    /// Register `api` for `backend` with explicit traits
    pub fn register_with_traits(self, backend: Backend, traits: BackendTraits, api: Arc<dyn NativeApi>) -> Self {
        self.register_plugin(Plugin::with_traits(backend, traits, api))
    }

    fn register_plugin(mut self, plugin: Plugin) -> Self {
        if !plugin.backend().is_linked() {
            tracing::warn!(backend = %plugin.backend(), "registered table for a backend that cannot be resolved");
        }
        self.plugins.insert(plugin.backend(), plugin);
        self
    }

    pub fn config(mut self, config: InteropConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            plugins: self.plugins,
            config: self.config,
        }
    }
}

/// Reference backend quirks for a linked backend
pub fn reference_sim_config(backend: Backend) -> Option<SimConfig> {
    match backend {
        Backend::OpenCl => Some(SimConfig::opencl()),
        Backend::LevelZero => Some(SimConfig::level_zero()),
        Backend::Cuda => Some(SimConfig::cuda()),
        Backend::Hip => Some(SimConfig::hip()),
        Backend::NativeCpu | Backend::EsimdEmulator | Backend::All => None,
    }
}

static GLOBAL: OnceLock<BackendRegistry> = OnceLock::new();

/// The process-wide registry, created with the reference backends on first use
pub fn global() -> &'static BackendRegistry {
    GLOBAL.get_or_init(|| {
        tracing::debug!("initialising process-wide backend registry with reference backends");
        BackendRegistry::with_reference_backends()
    })
}

/// Install `registry` as the process-wide registry
///
/// Only possible before the first use of [`global`].
pub fn install(registry: BackendRegistry) -> Result<&'static BackendRegistry> {
    GLOBAL
        .set(registry)
        .map_err(|_| InteropError::RegistryAlreadyInstalled)?;
    Ok(global())
}

/// Resolve `backend` in the process-wide registry
pub fn resolve_backend(backend: Backend) -> Result<Plugin> {
    global().resolve(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(config: SimConfig) -> Arc<dyn NativeApi> {
        Arc::new(SimBackend::new(config))
    }

    #[test]
    fn test_resolve_registered() {
        let registry = BackendRegistry::builder()
            .register(Backend::OpenCl, sim(SimConfig::opencl()))
            .build();

        let plugin = registry.resolve(Backend::OpenCl).unwrap();
        assert_eq!(plugin.backend(), Backend::OpenCl);
        assert_eq!(plugin.api().name(), "opencl");
        assert!(plugin.traits().needs_explicit_retain_on_import);
    }

    #[test]
    fn test_unregistered_linked_backend_unsupported() {
        let registry = BackendRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve(Backend::Hip),
            Err(InteropError::UnsupportedBackend(Backend::Hip))
        ));
    }

    #[test]
    fn test_unlinked_backend_never_resolves() {
        let registry = BackendRegistry::builder()
            .register(Backend::NativeCpu, sim(SimConfig::cuda()))
            .build();
        assert!(matches!(
            registry.resolve(Backend::NativeCpu),
            Err(InteropError::UnsupportedBackend(Backend::NativeCpu))
        ));
        assert!(registry.backends().is_empty());
    }

    #[test]
    fn test_reference_backends_are_distinct() {
        let registry = BackendRegistry::with_reference_backends();
        assert_eq!(registry.backends(), Backend::LINKED.to_vec());

        let plugins: Vec<_> = Backend::LINKED
            .into_iter()
            .map(|backend| registry.resolve(backend).unwrap())
            .collect();
        for (i, a) in plugins.iter().enumerate() {
            for b in &plugins[i + 1..] {
                assert!(!a.same_table(b));
            }
        }
    }

    #[test]
    fn test_resolve_twice_same_table() {
        let registry = BackendRegistry::with_reference_backends();
        let a = registry.resolve(Backend::Cuda).unwrap();
        let b = registry.resolve(Backend::Cuda).unwrap();
        assert!(a.same_table(&b));
    }

    #[test]
    fn test_custom_traits() {
        let traits = BackendTraits {
            needs_explicit_retain_on_import: true,
            kernel_import_requires_program: true,
        };
        let registry = BackendRegistry::builder()
            .register_with_traits(Backend::Cuda, traits, sim(SimConfig::cuda()))
            .build();
        assert_eq!(registry.resolve(Backend::Cuda).unwrap().traits(), traits);
    }
}
