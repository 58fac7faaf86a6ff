//! Who releases an imported native object

use hologram_native::NativeProperties;

/// Ownership of a native object handed to an import call
///
/// With [`Ownership::Transfer`] the managed wrapper takes over the caller's
/// reference and releases the native object exactly once when it is dropped.
/// With [`Ownership::Keep`] the wrapper never releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The caller keeps ownership
    Keep,
    /// Ownership moves to the runtime
    Transfer,
}

impl Ownership {
    /// Translate the caller-facing `keep_ownership` flag
    pub const fn from_keep_ownership(keep_ownership: bool) -> Self {
        if keep_ownership {
            Self::Keep
        } else {
            Self::Transfer
        }
    }

    pub const fn runtime_owns_native(self) -> bool {
        matches!(self, Self::Transfer)
    }

    /// Properties for a `*_create_with_native_handle` call
    pub const fn native_properties(self) -> NativeProperties {
        NativeProperties {
            is_native_handle_owned: self.runtime_owns_native(),
        }
    }
}
