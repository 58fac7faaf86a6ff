//! Backend identifiers and per-backend capabilities
//!
//! [`Backend`] names a compute backend the way callers do. Native platforms
//! report their kind as [`NativePlatformBackend`] (or, through the legacy
//! plugin interface, [`LegacyPlatformBackend`]); both mappings are total,
//! falling back to [`Backend::All`] for anything unrecognised.
//!
//! Reference-count and kernel-import quirks are data ([`BackendTraits`]),
//! looked up once per import.

use hologram_native::{LegacyPlatformBackend, NativePlatformBackend};
use std::fmt;

/// Compute backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// OpenCL
    OpenCl,
    /// oneAPI Level Zero
    LevelZero,
    /// CUDA
    Cuda,
    /// HIP
    Hip,
    /// Host CPU native backend
    NativeCpu,
    /// ESIMD emulator (legacy plugin interface only)
    EsimdEmulator,
    /// Wildcard: no specific backend
    All,
}

impl Backend {
    /// Backends with a native function table behind them
    pub const LINKED: [Backend; 4] = [Backend::OpenCl, Backend::LevelZero, Backend::Cuda, Backend::Hip];

    /// Every identifier, wildcard included
    pub const ALL: [Backend; 7] = [
        Backend::OpenCl,
        Backend::LevelZero,
        Backend::Cuda,
        Backend::Hip,
        Backend::NativeCpu,
        Backend::EsimdEmulator,
        Backend::All,
    ];

    /// Map the kind a native platform reports; unknown kinds map to [`Backend::All`]
    pub const fn from_native(kind: NativePlatformBackend) -> Self {
        match kind {
            NativePlatformBackend::LevelZero => Self::LevelZero,
            NativePlatformBackend::OpenCl => Self::OpenCl,
            NativePlatformBackend::Cuda => Self::Cuda,
            NativePlatformBackend::Hip => Self::Hip,
            NativePlatformBackend::NativeCpu => Self::NativeCpu,
            NativePlatformBackend::Unknown => Self::All,
        }
    }

    /// Map a raw native platform kind
    pub const fn from_native_raw(raw: u32) -> Self {
        Self::from_native(NativePlatformBackend::from_raw(raw))
    }

    /// Map the kind the legacy plugin interface reports
    pub const fn from_legacy(kind: LegacyPlatformBackend) -> Self {
        match kind {
            LegacyPlatformBackend::Unknown => Self::All,
            LegacyPlatformBackend::LevelZero => Self::LevelZero,
            LegacyPlatformBackend::OpenCl => Self::OpenCl,
            LegacyPlatformBackend::Cuda => Self::Cuda,
            LegacyPlatformBackend::Hip => Self::Hip,
            LegacyPlatformBackend::Esimd => Self::EsimdEmulator,
            LegacyPlatformBackend::NativeCpu => Self::NativeCpu,
        }
    }

    /// Native platform kind for this backend
    ///
    /// Backends the native interface does not know report
    /// [`NativePlatformBackend::Unknown`].
    pub const fn to_native(self) -> NativePlatformBackend {
        match self {
            Self::LevelZero => NativePlatformBackend::LevelZero,
            Self::OpenCl => NativePlatformBackend::OpenCl,
            Self::Cuda => NativePlatformBackend::Cuda,
            Self::Hip => NativePlatformBackend::Hip,
            Self::NativeCpu => NativePlatformBackend::NativeCpu,
            Self::EsimdEmulator | Self::All => NativePlatformBackend::Unknown,
        }
    }

    /// Whether a function table can be resolved for this backend
    pub const fn is_linked(self) -> bool {
        matches!(self, Self::OpenCl | Self::LevelZero | Self::Cuda | Self::Hip)
    }

    /// Native quirks of this backend
    pub const fn traits(self) -> BackendTraits {
        match self {
            Self::OpenCl => BackendTraits {
                needs_explicit_retain_on_import: true,
                kernel_import_requires_program: false,
            },
            Self::LevelZero => BackendTraits {
                needs_explicit_retain_on_import: false,
                kernel_import_requires_program: true,
            },
            _ => BackendTraits::DEFAULT,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenCl => "opencl",
            Self::LevelZero => "ext_oneapi_level_zero",
            Self::Cuda => "ext_oneapi_cuda",
            Self::Hip => "ext_oneapi_hip",
            Self::NativeCpu => "ext_oneapi_native_cpu",
            Self::EsimdEmulator => "ext_intel_esimd_emulator",
            Self::All => "all",
        })
    }
}

/// Per-backend native quirks consulted during import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendTraits {
    /// Creating a wrapper from a native handle does not take a reference;
    /// the importer issues one explicit retain right after creation.
    pub needs_explicit_retain_on_import: bool,
    /// Kernel creation needs the native program the kernel came from, so a
    /// kernel can only be imported against a single-image bundle.
    pub kernel_import_requires_program: bool,
}

impl BackendTraits {
    pub const DEFAULT: BackendTraits = BackendTraits {
        needs_explicit_retain_on_import: false,
        kernel_import_requires_program: false,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_only_four_backends_linked() {
        let linked: Vec<_> = Backend::ALL.into_iter().filter(|b| b.is_linked()).collect();
        assert_eq!(linked, Backend::LINKED.to_vec());
    }

    #[test]
    fn test_native_round_trip_for_native_kinds() {
        for backend in [
            Backend::OpenCl,
            Backend::LevelZero,
            Backend::Cuda,
            Backend::Hip,
            Backend::NativeCpu,
        ] {
            assert_eq!(Backend::from_native(backend.to_native()), backend);
        }
        assert_eq!(Backend::from_native(Backend::EsimdEmulator.to_native()), Backend::All);
    }

    #[test]
    fn test_legacy_esimd() {
        assert_eq!(Backend::from_legacy(LegacyPlatformBackend::Esimd), Backend::EsimdEmulator);
        assert_eq!(Backend::from_legacy(LegacyPlatformBackend::Unknown), Backend::All);
    }

    #[test]
    fn test_traits() {
        assert!(Backend::OpenCl.traits().needs_explicit_retain_on_import);
        assert!(!Backend::OpenCl.traits().kernel_import_requires_program);
        assert!(Backend::LevelZero.traits().kernel_import_requires_program);
        assert_eq!(Backend::Cuda.traits(), BackendTraits::default());
        assert_eq!(Backend::Hip.traits(), BackendTraits::DEFAULT);
    }

    proptest! {
        #[test]
        fn native_mapping_is_total(raw in any::<u32>()) {
            let backend = Backend::from_native_raw(raw);
            if raw == 0 || raw > 5 {
                prop_assert_eq!(backend, Backend::All);
            } else {
                prop_assert_ne!(backend, Backend::All);
            }
        }

        #[test]
        fn legacy_mapping_is_total(raw in 0u32..7) {
            let kind = LegacyPlatformBackend::from_raw(raw);
            prop_assert!(kind.is_some());
            let backend = kind.map(Backend::from_legacy);
            prop_assert_eq!(backend == Some(Backend::All), raw == 0);
        }
    }
}
