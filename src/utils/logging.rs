//! Logging macros for the long-running loops (capture, driver, consumers).
//!
//! Each loop module declares its own switch and the macros read it:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn};
//!
//! log_info!("tick {} published to {} subscribers", tick, delivered);
//! ```
//! Flip the constant to `false` to silence a chatty loop without touching `RUST_LOG`.

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Debug output is additionally gated on `NEB_DEBUG` so per-tick chatter stays off
/// by default even when `RUST_LOG=debug`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS && $crate::utils::debug_enabled() {
            log::debug!($($arg)*);
        }
    };
}
