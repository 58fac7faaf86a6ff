//! Import configuration
//!
//! # Environment Variables
//!
//! - `HOLOGRAM_PROGRAM_COMPILE_OPTIONS` - options passed to program compile and build
//! - `HOLOGRAM_PROGRAM_LINK_OPTIONS` - options passed to program link

use std::env;

/// Options applied while reconciling imported programs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteropConfig {
    /// Options for compile and build, `None` for the backend default
    pub compile_options: Option<String>,
    /// Options for link, `None` for the backend default
    pub link_options: Option<String>,
}

impl InteropConfig {
    /// Read options from the environment; empty values count as unset
    pub fn from_env() -> Self {
        Self {
            compile_options: non_empty_var("HOLOGRAM_PROGRAM_COMPILE_OPTIONS"),
            link_options: non_empty_var("HOLOGRAM_PROGRAM_LINK_OPTIONS"),
        }
    }

    pub fn with_compile_options(mut self, options: impl Into<String>) -> Self {
        self.compile_options = Some(options.into());
        self
    }

    pub fn with_link_options(mut self, options: impl Into<String>) -> Self {
        self.link_options = Some(options.into());
        self
    }

    pub fn compile_options(&self) -> Option<&str> {
        self.compile_options.as_deref()
    }

    pub fn link_options(&self) -> Option<&str> {
        self.link_options.as_deref()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("HOLOGRAM_PROGRAM_COMPILE_OPTIONS", "-cl-fast-relaxed-math");
        env::set_var("HOLOGRAM_PROGRAM_LINK_OPTIONS", "  ");
        let config = InteropConfig::from_env();
        env::remove_var("HOLOGRAM_PROGRAM_COMPILE_OPTIONS");
        env::remove_var("HOLOGRAM_PROGRAM_LINK_OPTIONS");

        assert_eq!(config.compile_options(), Some("-cl-fast-relaxed-math"));
        assert_eq!(config.link_options(), None);
    }

    #[test]
    fn test_builder() {
        let config = InteropConfig::default()
            .with_compile_options("-O3")
            .with_link_options("-cl-denorms-are-zero");
        assert_eq!(config.compile_options(), Some("-O3"));
        assert_eq!(config.link_options(), Some("-cl-denorms-are-zero"));
    }
}
