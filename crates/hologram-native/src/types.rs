//! Enumerations and property blocks exchanged with the native layer

use std::fmt;

/// Backend kind a native platform reports about itself
///
/// Decoded from the function table's raw platform-backend query. Raw values
/// the runtime does not recognise decode to [`NativePlatformBackend::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativePlatformBackend {
    Unknown,
    LevelZero,
    OpenCl,
    Cuda,
    Hip,
    NativeCpu,
}

impl NativePlatformBackend {
    /// Decode a raw platform-backend value
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::LevelZero,
            2 => Self::OpenCl,
            3 => Self::Cuda,
            4 => Self::Hip,
            5 => Self::NativeCpu,
            _ => Self::Unknown,
        }
    }

    /// Raw value as reported by the native layer
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::LevelZero => 1,
            Self::OpenCl => 2,
            Self::Cuda => 3,
            Self::Hip => 4,
            Self::NativeCpu => 5,
        }
    }
}

/// Backend kind as reported by the legacy plugin interface
///
/// The legacy interface numbers its kinds differently and still knows the
/// ESIMD emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyPlatformBackend {
    Unknown,
    LevelZero,
    OpenCl,
    Cuda,
    Hip,
    Esimd,
    NativeCpu,
}

impl LegacyPlatformBackend {
    /// Decode a raw legacy value, `None` if it is outside the legacy table
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Unknown),
            1 => Some(Self::LevelZero),
            2 => Some(Self::OpenCl),
            3 => Some(Self::Cuda),
            4 => Some(Self::Hip),
            5 => Some(Self::Esimd),
            6 => Some(Self::NativeCpu),
            _ => None,
        }
    }
}

/// Compilation stage of a program for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramBinaryType {
    /// Nothing built yet (source or IL only)
    None,
    /// Compiled object, not linked
    CompiledObject,
    /// Library, linkable into an executable
    Library,
    /// Linked executable
    Executable,
}

impl fmt::Display for ProgramBinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::CompiledObject => "compiled-object",
            Self::Library => "library",
            Self::Executable => "executable",
        };
        f.write_str(name)
    }
}

/// Properties passed to every `*_create_with_native_handle` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeProperties {
    /// When set, the plugin object takes over the caller's reference and
    /// releases the native object when the plugin object itself is released.
    pub is_native_handle_owned: bool,
}

impl NativeProperties {
    pub const fn owned() -> Self {
        Self {
            is_native_handle_owned: true,
        }
    }

    pub const fn borrowed() -> Self {
        Self {
            is_native_handle_owned: false,
        }
    }
}

/// Command queue creation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFlags {
    pub out_of_order: bool,
    pub profiling: bool,
}

/// Properties for importing a native queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueNativeProperties {
    pub native: NativeProperties,
    pub flags: QueueFlags,
    /// Backend-specific descriptor of the native queue (e.g. Level Zero
    /// command list vs. immediate command list)
    pub native_desc: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_backend_raw_values() {
        for kind in [
            NativePlatformBackend::Unknown,
            NativePlatformBackend::LevelZero,
            NativePlatformBackend::OpenCl,
            NativePlatformBackend::Cuda,
            NativePlatformBackend::Hip,
            NativePlatformBackend::NativeCpu,
        ] {
            assert_eq!(NativePlatformBackend::from_raw(kind.as_raw()), kind);
        }
        assert_eq!(NativePlatformBackend::from_raw(0x7fff), NativePlatformBackend::Unknown);
    }

    #[test]
    fn test_legacy_backend_raw_values() {
        assert_eq!(LegacyPlatformBackend::from_raw(5), Some(LegacyPlatformBackend::Esimd));
        assert_eq!(LegacyPlatformBackend::from_raw(6), Some(LegacyPlatformBackend::NativeCpu));
        assert_eq!(LegacyPlatformBackend::from_raw(7), None);
    }

    #[test]
    fn test_native_properties() {
        assert!(NativeProperties::owned().is_native_handle_owned);
        assert!(!NativeProperties::borrowed().is_native_handle_owned);
        assert_eq!(NativeProperties::default(), NativeProperties::borrowed());
    }
}
