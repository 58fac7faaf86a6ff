//! Error types for hologram-interop operations

use crate::backend::Backend;
use crate::bundle::BundleState;
use hologram_native::{DeviceHandle, NativeError, ProgramBinaryType};

/// Result type for hologram-interop operations
pub type Result<T> = std::result::Result<T, InteropError>;

/// Program operation that failed during build-state reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOperation {
    Compile,
    Build,
    Link,
}

impl std::fmt::Display for BuildOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Compile => "compile",
            Self::Build => "build",
            Self::Link => "link",
        })
    }
}

/// Errors that can occur while importing native objects
#[derive(Debug, thiserror::Error)]
pub enum InteropError {
    /// Backend identifier is not one of the linked concrete backends, or
    /// no function table is registered for it
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(Backend),

    /// Discovered program stage cannot reach the requested bundle state
    #[error("program and kernel_bundle state mismatch: program is {discovered}, requested {target}")]
    BuildStateMismatch {
        discovered: ProgramBinaryType,
        target: BundleState,
    },

    /// Compile, build or link failed for a reason other than "unsupported"
    #[error("program {operation} failed for {device}: {source}")]
    BuildFailed {
        operation: BuildOperation,
        device: DeviceHandle,
        #[source]
        source: NativeError,
    },

    /// Kernel import against a bundle that is not executable
    #[error("kernel_bundle must be executable, found {state}")]
    BundleNotExecutable { state: BundleState },

    /// Kernel import against a bundle that does not hold exactly one image
    #[error("kernel_bundle must have single program image, found {images}")]
    InvalidBundleShape { images: usize },

    /// Native object lookup miss
    #[error("invalid native object: {0}")]
    InvalidNativeObject(String),

    /// Property not accepted by the import
    #[error("invalid property: {0}")]
    InvalidProperty(String),

    /// Bundles cannot be joined
    #[error("incompatible kernel bundles: {0}")]
    IncompatibleBundles(String),

    /// The process-wide registry was already set up
    #[error("backend registry already installed")]
    RegistryAlreadyInstalled,

    /// Any other native call failure
    #[error("native call failed: {0}")]
    Native(#[from] NativeError),
}

impl InteropError {
    /// Whether this error left the native program mutated for some devices
    ///
    /// Reconciliation never rolls back; a caller seeing this must not reuse
    /// the native program handle.
    pub fn may_have_mutated_program(&self) -> bool {
        matches!(self, Self::BuildFailed { .. } | Self::BuildStateMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failed_carries_native_log() {
        let err = InteropError::BuildFailed {
            operation: BuildOperation::Link,
            device: DeviceHandle::new(3),
            source: NativeError::link_failure("unresolved symbol foo"),
        };
        let message = err.to_string();
        assert!(message.contains("link"));
        assert!(message.contains("unresolved symbol foo"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_native_error_converts() {
        let err: InteropError = NativeError::InvalidMemObject(9).into();
        assert!(matches!(err, InteropError::Native(NativeError::InvalidMemObject(9))));
        assert!(!err.may_have_mutated_program());
    }

    #[test]
    fn test_not_executable_message() {
        let err = InteropError::BundleNotExecutable {
            state: BundleState::Input,
        };
        assert_eq!(err.to_string(), "kernel_bundle must be executable, found input");
        assert!(!err.may_have_mutated_program());
    }

    #[test]
    fn test_mismatch_message() {
        let err = InteropError::BuildStateMismatch {
            discovered: ProgramBinaryType::Executable,
            target: BundleState::Object,
        };
        assert!(err.to_string().contains("state mismatch"));
    }
}
