//! Import timing
//!
//! [`ImportTimer`] measures one import entry point and reports its duration
//! when dropped, but only if the duration reaches the threshold. The
//! process-wide threshold is set by [`init_global_tracing`](crate::init_global_tracing)
//! from `HOLOGRAM_IMPORT_TIMING_THRESHOLD_US`; individual timers can override it.
//!
//! ## Example
//!
//! ```rust
//! use hologram_tracing::ImportTimer;
//!
//! {
//!     let _timer = ImportTimer::start("import_program");
//!     // ... reconcile, assemble ...
//! } // reported at debug level if above the threshold
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// `u64::MAX` means "no threshold"
static THRESHOLD_US: AtomicU64 = AtomicU64::new(u64::MAX);

/// Set the process-wide import timing threshold
pub fn set_import_timing_threshold_us(threshold_us: Option<u64>) {
    THRESHOLD_US.store(threshold_us.unwrap_or(u64::MAX), Ordering::Relaxed);
}

/// Current process-wide import timing threshold
pub fn import_timing_threshold_us() -> Option<u64> {
    match THRESHOLD_US.load(Ordering::Relaxed) {
        u64::MAX => None,
        threshold => Some(threshold),
    }
}

/// RAII guard reporting how long an import took
pub struct ImportTimer {
    operation: &'static str,
    threshold_us: Option<u64>,
    start_time: Instant,
}

impl ImportTimer {
    /// Start timing `operation` against the process-wide threshold
    pub fn start(operation: &'static str) -> Self {
        Self::with_threshold(operation, import_timing_threshold_us())
    }

    /// Start timing `operation`; `None` reports regardless of duration
    pub fn with_threshold(operation: &'static str, threshold_us: Option<u64>) -> Self {
        Self {
            operation,
            threshold_us,
            start_time: Instant::now(),
        }
    }

    /// Operation being timed
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Microseconds since the timer started
    pub fn elapsed_us(&self) -> u64 {
        u64::try_from(self.start_time.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Whether a duration of `elapsed_us` would be reported
    pub fn should_report(&self, elapsed_us: u64) -> bool {
        self.threshold_us.is_none_or(|t| elapsed_us >= t)
    }
}

impl Drop for ImportTimer {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.should_report(elapsed_us) {
            tracing::debug!(
                operation = self.operation,
                duration_us = elapsed_us,
                "import_complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn threshold_filters_short_imports() {
        let timer = ImportTimer::with_threshold("import_kernel", Some(1_000));
        assert!(!timer.should_report(999));
        assert!(timer.should_report(1_000));
    }

    #[test]
    fn no_threshold_reports_everything() {
        let timer = ImportTimer::with_threshold("import_kernel", None);
        assert!(timer.should_report(0));
        assert_eq!(timer.operation(), "import_kernel");
    }

    #[test]
    #[serial]
    fn process_wide_threshold() {
        set_import_timing_threshold_us(Some(50));
        assert_eq!(import_timing_threshold_us(), Some(50));
        assert!(!ImportTimer::start("make_queue").should_report(10));

        set_import_timing_threshold_us(None);
        assert_eq!(import_timing_threshold_us(), None);
    }
}
