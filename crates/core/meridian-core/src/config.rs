//! Kernel configuration bridge.
//!
//! Compile-time configuration values, resolved once here so the rest of
//! the kernel has a single source of truth. Values that can be overridden
//! at build time are read from the build environment.

use crate::log::LogLevel;

/// Maximum kernel log level (compile-time). Messages more verbose than this
/// are discarded before reaching the registered sink.
///
/// Set with `MERIDIAN_LOG_LEVEL=error|warn|info|debug|trace` at build time.
pub const MAX_LOG_LEVEL: LogLevel = match option_env!("MERIDIAN_LOG_LEVEL") {
    Some(level) => match level.as_bytes() {
        b"error" => LogLevel::Error,
        b"warn" => LogLevel::Warn,
        b"info" => LogLevel::Info,
        b"debug" => LogLevel::Debug,
        b"trace" => LogLevel::Trace,
        _ => LogLevel::Debug,
    },
    None => LogLevel::Debug,
};

/// Maximum number of processors the kernel brings up.
pub const MAX_CPUS: usize = 32;

/// Project version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
