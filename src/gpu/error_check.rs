//! Process-wide switches for synchronous driver error checks.
//!
//! With checks enabled every state-affecting context call drains the
//! driver's pending errors and fails with [`TesseraError::Driver`]. The
//! switch defaults to on in debug builds and off in release builds.
//!
//! [`TesseraError::Driver`]: crate::error::TesseraError::Driver

use std::sync::atomic::{AtomicBool, Ordering};

static ERROR_CHECKS: AtomicBool = AtomicBool::new(cfg!(debug_assertions));
static ERROR_LOG: AtomicBool = AtomicBool::new(true);

/// Turn synchronous error checks on or off for every context.
pub fn enable_error_checks(enable: bool) {
    ERROR_CHECKS.store(enable, Ordering::Relaxed);
}

/// Whether optional error checks run.
#[must_use]
pub fn error_checks_enabled() -> bool {
    ERROR_CHECKS.load(Ordering::Relaxed)
}

/// Turn logging of detected driver errors on or off.
pub fn enable_error_log(enable: bool) {
    ERROR_LOG.store(enable, Ordering::Relaxed);
}

/// Whether detected driver errors are logged.
#[must_use]
pub fn error_log_enabled() -> bool {
    ERROR_LOG.load(Ordering::Relaxed)
}
