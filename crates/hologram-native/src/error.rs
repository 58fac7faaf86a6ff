//! Error types for native backend calls

use crate::handle::NativeHandle;

/// Result type for native backend calls
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Result codes a native function table can report
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    /// The backend does not implement this entry point
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// Plugin handle does not name a live object of the expected kind
    #[error("invalid {kind} handle: {id}")]
    InvalidHandle { kind: &'static str, id: u64 },

    /// Native handle does not name a live native object of the expected kind
    #[error("invalid native {kind} handle: {handle}")]
    InvalidNativeHandle { kind: &'static str, handle: NativeHandle },

    /// Argument rejected by the backend
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Compiling or building a program failed
    #[error("program build failure: {log}")]
    BuildFailure { log: String },

    /// Linking programs failed
    #[error("program link failure: {log}")]
    LinkFailure { log: String },

    /// Memory object unknown to the backend
    #[error("invalid memory object: {0}")]
    InvalidMemObject(u64),

    /// Release on an object whose reference count is already zero
    #[error("reference count underflow on {kind} {id}")]
    RefCountUnderflow { kind: &'static str, id: u64 },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl NativeError {
    /// Whether the backend reported the entry point as unimplemented
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedFeature(_))
    }

    /// Create a build failure carrying the backend's log
    pub fn build_failure(log: impl Into<String>) -> Self {
        Self::BuildFailure { log: log.into() }
    }

    /// Create a link failure carrying the backend's log
    pub fn link_failure(log: impl Into<String>) -> Self {
        Self::LinkFailure { log: log.into() }
    }

    /// Create an invalid value error
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_unsupported() {
        assert!(NativeError::UnsupportedFeature("program_build_exp").is_unsupported());
        assert!(!NativeError::build_failure("syntax error").is_unsupported());
    }

    #[test]
    fn test_display_carries_log() {
        let err = NativeError::build_failure("error: use of undeclared identifier 'x'");
        assert!(err.to_string().contains("undeclared identifier"));
    }
}
